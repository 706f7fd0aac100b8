// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test utilities and macros for use across multiple crates.
//!
//! The polling defaults mirror the convergence bound routers are held to:
//! 60 polls at 500ms spacing.

pub const DEFAULT_INTERVAL_MS: u64 = 500;
pub const DEFAULT_ITERATIONS: u64 = 60;

#[macro_export]
macro_rules! wait_for_eq {
    ($lhs:expr, $rhs:expr, $period_ms:expr, $count:expr) => {
        $crate::wait_for!($lhs, ==, $rhs, $period_ms, $count);
    };
    ($lhs:expr, $rhs:expr) => {
        $crate::wait_for!(
            $lhs,
            ==,
            $rhs,
            $crate::test::DEFAULT_INTERVAL_MS,
            $crate::test::DEFAULT_ITERATIONS
        );
    };
}

#[macro_export]
macro_rules! wait_for_neq {
    ($lhs:expr, $rhs:expr, $period_ms:expr, $count:expr) => {
        $crate::wait_for!($lhs, !=, $rhs, $period_ms, $count);
    };
    ($lhs:expr, $rhs:expr) => {
        $crate::wait_for!(
            $lhs,
            !=,
            $rhs,
            $crate::test::DEFAULT_INTERVAL_MS,
            $crate::test::DEFAULT_ITERATIONS
        );
    };
}

#[macro_export]
macro_rules! wait_for {
    ($lhs:expr, $op:tt, $rhs:expr, $period_ms:expr, $count:expr) => {
        let mut ok = false;
        for _ in 0..$count {
            if $lhs $op $rhs {
                ok = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis($period_ms));
        }
        if !ok {
            assert_eq!($lhs, $rhs);
        }
    };
    ($lhs:expr, $op:tt, $rhs:expr) => {
        $crate::wait_for!(
            $lhs,
            $op,
            $rhs,
            $crate::test::DEFAULT_INTERVAL_MS,
            $crate::test::DEFAULT_ITERATIONS
        );
    };
}

#[macro_export]
macro_rules! parse {
    ($x:expr, $err:expr) => {
        $x.parse().expect($err)
    };
}

#[macro_export]
macro_rules! prefix {
    ($x:expr) => {
        $crate::parse!($x, "prefix")
    };
}

#[macro_export]
macro_rules! sockaddr {
    ($x:expr) => {
        $crate::parse!($x, "socket address")
    };
}
