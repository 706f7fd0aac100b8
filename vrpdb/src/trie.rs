// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary prefix trie holding VRPs at the node for their prefix.
//!
//! Nodes are reference counted and copied on write, so cloning a trie is
//! cheap and a mutation copies only the path from the root to the node it
//! touches. This is what lets each commit build a new snapshot from the
//! previous one without copying the whole table.

use rpki_types::{Prefix, Vrp};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
struct Node {
    entries: BTreeSet<Vrp>,
    children: [Option<Arc<Node>>; 2],
}

impl Node {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.children[0].is_none()
            && self.children[1].is_none()
    }
}

/// Prefix bits left aligned in a u128 so both families walk the same way.
fn key(prefix: &Prefix) -> u128 {
    match prefix {
        Prefix::V4(p) => (p.value.to_bits() as u128) << 96,
        Prefix::V6(p) => p.value.to_bits(),
    }
}

fn bit(key: u128, depth: u8) -> usize {
    ((key >> (127 - u32::from(depth))) & 1) as usize
}

fn insert(node: &mut Node, key: u128, len: u8, depth: u8, vrp: Vrp) -> bool {
    if depth == len {
        return node.entries.insert(vrp);
    }
    let child = node.children[bit(key, depth)]
        .get_or_insert_with(|| Arc::new(Node::default()));
    insert(Arc::make_mut(child), key, len, depth + 1, vrp)
}

fn remove(node: &mut Node, key: u128, len: u8, depth: u8, vrp: &Vrp) -> bool {
    if depth == len {
        return node.entries.remove(vrp);
    }
    let b = bit(key, depth);
    let Some(child) = node.children[b].as_mut() else {
        return false;
    };
    let child = Arc::make_mut(child);
    let removed = remove(child, key, len, depth + 1, vrp);
    if removed && child.is_empty() {
        node.children[b] = None;
    }
    removed
}

#[derive(Clone, Debug, Default)]
pub(crate) struct VrpTrie {
    v4: Node,
    v6: Node,
    len: usize,
    v4_len: usize,
}

impl VrpTrie {
    fn root(&self, prefix: &Prefix) -> &Node {
        match prefix {
            Prefix::V4(_) => &self.v4,
            Prefix::V6(_) => &self.v6,
        }
    }

    fn root_mut(&mut self, prefix: &Prefix) -> &mut Node {
        match prefix {
            Prefix::V4(_) => &mut self.v4,
            Prefix::V6(_) => &mut self.v6,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn v4_len(&self) -> usize {
        self.v4_len
    }

    pub fn v6_len(&self) -> usize {
        self.len - self.v4_len
    }

    pub fn insert(&mut self, vrp: Vrp) -> bool {
        let (k, len) = (key(&vrp.prefix), vrp.prefix.length());
        let added = insert(self.root_mut(&vrp.prefix), k, len, 0, vrp);
        if added {
            self.len += 1;
            if vrp.prefix.is_v4() {
                self.v4_len += 1;
            }
        }
        added
    }

    pub fn remove(&mut self, vrp: &Vrp) -> bool {
        // Avoid copying the path down to a node that does not hold the entry.
        if !self.contains(vrp) {
            return false;
        }
        let (k, len) = (key(&vrp.prefix), vrp.prefix.length());
        let removed = remove(self.root_mut(&vrp.prefix), k, len, 0, vrp);
        if removed {
            self.len -= 1;
            if vrp.prefix.is_v4() {
                self.v4_len -= 1;
            }
        }
        removed
    }

    pub fn contains(&self, vrp: &Vrp) -> bool {
        let (k, len) = (key(&vrp.prefix), vrp.prefix.length());
        let mut node = self.root(&vrp.prefix);
        for depth in 0..len {
            match node.children[bit(k, depth)].as_deref() {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.entries.contains(vrp)
    }

    /// Entries whose prefix is equal to or less specific than `prefix`,
    /// shortest prefix first.
    pub fn covering(&self, prefix: &Prefix) -> Covering<'_> {
        Covering {
            node: Some(self.root(prefix)),
            key: key(prefix),
            len: prefix.length().min(prefix.host_mask()),
            depth: 0,
            entries: None,
        }
    }

    /// All entries in `Vrp` order: IPv4 before IPv6, then by address,
    /// prefix length, max length and origin.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: vec![&self.v6, &self.v4],
            entries: None,
        }
    }
}

pub(crate) struct Covering<'a> {
    node: Option<&'a Node>,
    key: u128,
    len: u8,
    depth: u8,
    entries: Option<btree_set::Iter<'a, Vrp>>,
}

impl<'a> Iterator for Covering<'a> {
    type Item = &'a Vrp;

    fn next(&mut self) -> Option<&'a Vrp> {
        loop {
            if let Some(v) = self.entries.as_mut().and_then(|e| e.next()) {
                return Some(v);
            }
            let node = self.node?;
            self.entries = Some(node.entries.iter());
            self.node = if self.depth < self.len {
                let b = bit(self.key, self.depth);
                self.depth += 1;
                node.children[b].as_deref()
            } else {
                None
            };
        }
    }
}

pub(crate) struct Iter<'a> {
    stack: Vec<&'a Node>,
    entries: Option<btree_set::Iter<'a, Vrp>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Vrp;

    fn next(&mut self) -> Option<&'a Vrp> {
        loop {
            if let Some(v) = self.entries.as_mut().and_then(|e| e.next()) {
                return Some(v);
            }
            // Pre-order with the zero branch first yields address order.
            let node = self.stack.pop()?;
            for child in node.children.iter().rev().flatten() {
                self.stack.push(child.as_ref());
            }
            self.entries = Some(node.entries.iter());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vrp(p: &str, max: u8, asn: u32) -> Vrp {
        Vrp::new(p.parse().unwrap(), max, asn).unwrap()
    }

    #[test]
    fn insert_remove_prunes() {
        let mut t = VrpTrie::default();
        let a = vrp("10.0.0.0/8", 24, 1);
        let b = vrp("10.1.0.0/16", 16, 2);
        assert!(t.insert(a));
        assert!(!t.insert(a));
        assert!(t.insert(b));
        assert_eq!(t.len(), 2);
        assert!(t.remove(&b));
        assert!(!t.remove(&b));
        assert!(t.contains(&a));
        assert!(!t.contains(&b));
        assert!(t.v4.children[0].is_some());
        assert!(t.remove(&a));
        assert!(t.v4.is_empty());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn covering_walks_path() {
        let mut t = VrpTrie::default();
        for v in [
            vrp("0.0.0.0/0", 32, 1),
            vrp("10.0.0.0/8", 24, 1),
            vrp("10.1.0.0/16", 24, 2),
            vrp("10.2.0.0/16", 24, 3),
            vrp("2001:db8::/32", 48, 4),
        ] {
            t.insert(v);
        }
        let p: Prefix = "10.1.2.0/24".parse().unwrap();
        let got: Vec<Vrp> = t.covering(&p).copied().collect();
        assert_eq!(
            got,
            vec![
                vrp("0.0.0.0/0", 32, 1),
                vrp("10.0.0.0/8", 24, 1),
                vrp("10.1.0.0/16", 24, 2),
            ]
        );
        let p: Prefix = "2001:db8:1::/48".parse().unwrap();
        assert_eq!(t.covering(&p).count(), 1);
    }

    #[test]
    fn host_routes_and_overlong_lengths() {
        let mut t = VrpTrie::default();
        let host = vrp("2001:db8::1/128", 128, 7);
        t.insert(host);
        let p: Prefix = "2001:db8::1/128".parse().unwrap();
        assert_eq!(t.covering(&p).copied().collect::<Vec<_>>(), vec![host]);

        // Fields are public, so a caller can build a length no parser
        // accepts. The walk stops at the family's host length.
        let long = Prefix::V6(rpki_types::Prefix6 {
            value: "2001:db8::1".parse().unwrap(),
            length: 200,
        });
        assert_eq!(t.covering(&long).count(), 1);
    }

    #[test]
    fn iteration_is_ordered() {
        let mut t = VrpTrie::default();
        let mut expected = vec![
            vrp("10.1.0.0/16", 24, 2),
            vrp("2001:db8::/32", 48, 4),
            vrp("10.0.0.0/24", 24, 9),
            vrp("10.0.0.0/8", 24, 1),
            vrp("10.128.0.0/9", 9, 5),
            vrp("10.0.0.0/8", 8, 1),
        ];
        for v in &expected {
            t.insert(*v);
        }
        expected.sort();
        let got: Vec<Vrp> = t.iter().copied().collect();
        assert_eq!(got, expected);
        assert_eq!(t.v4_len(), 5);
        assert_eq!(t.v6_len(), 1);
    }

    #[test]
    fn clones_share_until_written() {
        let mut a = VrpTrie::default();
        a.insert(vrp("10.0.0.0/8", 24, 1));
        let mut b = a.clone();
        b.insert(vrp("10.1.0.0/16", 24, 2));
        b.remove(&vrp("10.0.0.0/8", 24, 1));
        assert_eq!(a.len(), 1);
        assert!(a.contains(&vrp("10.0.0.0/8", 24, 1)));
        assert!(!a.contains(&vrp("10.1.0.0/16", 24, 2)));
        assert_eq!(b.len(), 1);
    }
}
