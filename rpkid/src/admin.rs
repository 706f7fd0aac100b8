// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::instance::RpkiContext;
use crate::rpki_admin;
use dropshot::{ApiDescription, ConfigDropshot, HttpServerStarter};
use slog::o;
use slog::{error, info, warn, Logger};
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct HandlerContext {
    pub rpki: RpkiContext,
    pub log: Logger,
}

impl HandlerContext {
    pub fn new(log: Logger) -> Self {
        Self {
            rpki: RpkiContext::new(log.clone()),
            log,
        }
    }
}

pub fn start_server(
    log: Logger,
    addr: IpAddr,
    port: u16,
    context: Arc<HandlerContext>,
) -> Result<JoinHandle<()>, String> {
    let sa = SocketAddr::new(addr, port);
    let ds_config = ConfigDropshot {
        bind_address: sa,
        request_body_max_bytes: 1024 * 1024 * 64,
        ..Default::default()
    };

    let ds_log = log.new(o!("unit" => "api-server"));

    let api = api_description();

    let server = HttpServerStarter::new(&ds_config, api, context, &ds_log)
        .map_err(|e| format!("new admin dropshot: {}", e))?;

    info!(log, "admin: listening on {}", sa);

    Ok(tokio::spawn(async move {
        match server.start().await {
            Ok(_) => warn!(log, "admin: unexpected server exit"),
            Err(e) => error!(log, "admin: server start error {:?}", e),
        }
    }))
}

#[macro_export]
macro_rules! register {
    ($api:expr, $endpoint:expr) => {
        $api.register($endpoint).expect(stringify!($endpoint))
    };
}

pub fn api_description() -> ApiDescription<Arc<HandlerContext>> {
    let mut api = ApiDescription::new();
    rpki_admin::api_description(&mut api);
    api
}

pub fn apigen(path: &str) -> anyhow::Result<()> {
    let api = api_description();
    let openapi = api.openapi("RPKI Admin", "0.1.0");
    let mut out = File::create(path)?;
    openapi.write(&mut out)?;
    Ok(())
}
