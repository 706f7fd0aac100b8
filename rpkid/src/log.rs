// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

macro_rules! admin_log {
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RPKID,
            "module" => crate::MOD_ADMIN,
            "unit" => UNIT_RPKI,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_RPKID,
            "module" => crate::MOD_ADMIN,
            "unit" => UNIT_RPKI,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_RPKID,
            "module" => crate::MOD_ADMIN,
            "unit" => UNIT_RPKI
        )
    };
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RPKID,
            "module" => crate::MOD_ADMIN,
            "unit" => UNIT_RPKI
        )
    };
}

pub(crate) use admin_log;
