// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

macro_rules! session_log {
    ($self:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_SESSION,
            "unit" => UNIT_SESSION_RUNNER,
            "cache" => $self.config.id().to_string(),
            "instance" => $self.instance,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_SESSION,
            "unit" => UNIT_SESSION_RUNNER,
            "cache" => $self.config.id().to_string(),
            "instance" => $self.instance,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_SESSION,
            "unit" => UNIT_SESSION_RUNNER,
            "cache" => $self.config.id().to_string(),
            "instance" => $self.instance,
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_SESSION,
            "unit" => UNIT_SESSION_RUNNER,
            "cache" => $self.config.id().to_string(),
            "instance" => $self.instance,
        )
    };
}

macro_rules! manager_log {
    ($self:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_MANAGER,
            "unit" => UNIT_CACHE_SET,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_MANAGER,
            "unit" => UNIT_CACHE_SET,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_MANAGER,
            "unit" => UNIT_CACHE_SET,
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_MANAGER,
            "unit" => UNIT_CACHE_SET,
        )
    };
}

macro_rules! connection_log {
    ($self:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_CONNECTION,
            "peer" => $self.peer,
            "connection" => $self.id,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_CONNECTION,
            "peer" => $self.peer,
            "connection" => $self.id,
            $($key => $value),*
        )
    };
    ($self:expr, $level:ident, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_CONNECTION,
            "peer" => $self.peer,
            "connection" => $self.id,
        )
    };
    ($self:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RTR,
            "module" => crate::MOD_CONNECTION,
            "peer" => $self.peer,
            "connection" => $self.id,
        )
    };
}

pub(crate) use connection_log;
pub(crate) use manager_log;
pub(crate) use session_log;
