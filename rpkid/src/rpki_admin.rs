// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{admin::HandlerContext, error::Error, log::admin_log, register};
use dropshot::{
    endpoint, ApiDescription, HttpError, HttpResponseDeleted, HttpResponseOk,
    HttpResponseUpdatedNoContent, Query, RequestContext, TypedBody,
};
use rpki_types::{
    Announcement, CacheConnectionReport, PrefixLookup, PrefixTable,
    RouteRpkiInfo, RpkiState,
};
use rtr::config::{CacheConfig, SessionTimers};
use rtr::RTR_PORT;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use vrpdb::{ImportPolicy, RevalidationStats};

const UNIT_RPKI: &str = "rpki";

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct VrfSelector {
    pub vrf: Option<String>,
}

/// `rpki cache <address> <port> preference <n>`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CacheRequest {
    pub vrf: Option<String>,
    pub address: IpAddr,
    pub port: Option<u16>,
    pub preference: u8,
    pub timers: Option<SessionTimers>,
}

impl From<CacheRequest> for CacheConfig {
    fn from(rq: CacheRequest) -> Self {
        let mut c = CacheConfig::new(
            rq.address,
            rq.port.unwrap_or(RTR_PORT),
            rq.preference,
        );
        if let Some(t) = rq.timers {
            c.timers = t;
        }
        c
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DeleteCacheRequest {
    pub vrf: Option<String>,
    pub address: IpAddr,
    pub port: Option<u16>,
    pub preference: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PrefixTableQuery {
    pub vrf: Option<String>,
    pub asn: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PrefixQuery {
    pub vrf: Option<String>,
    pub prefix: String,
    pub origin_as: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RoutesRequest {
    pub vrf: Option<String>,
    pub routes: Vec<Announcement>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RoutesQuery {
    pub vrf: Option<String>,
    pub state: Option<RpkiState>,
    /// Only routes admitted by the import policy.
    #[serde(default)]
    pub accepted: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImportPolicyRequest {
    pub vrf: Option<String>,
    pub policy: ImportPolicy,
}

pub(crate) fn api_description(api: &mut ApiDescription<Arc<HandlerContext>>) {
    register!(api, add_cache);
    register!(api, delete_cache);
    register!(api, get_caches);
    register!(api, get_prefix_table);
    register!(api, get_prefix);
    register!(api, get_cache_connection);
    register!(api, announce_routes);
    register!(api, withdraw_routes);
    register!(api, get_routes);
    register!(api, set_import_policy);
    register!(api, get_import_policy);
    register!(api, get_revalidation);
    register!(api, get_vrfs);
}

#[endpoint { method = GET, path = "/rpki/vrfs" }]
pub async fn get_vrfs(
    ctx: RequestContext<Arc<HandlerContext>>,
) -> Result<HttpResponseOk<Vec<String>>, HttpError> {
    Ok(HttpResponseOk(ctx.context().rpki.vrfs()))
}

#[endpoint { method = PUT, path = "/rpki/cache" }]
pub async fn add_cache(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: TypedBody<CacheRequest>,
) -> Result<HttpResponseUpdatedNoContent, HttpError> {
    helpers::add_cache(ctx.context(), request.into_inner())?;
    Ok(HttpResponseUpdatedNoContent())
}

#[endpoint { method = DELETE, path = "/rpki/cache" }]
pub async fn delete_cache(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: TypedBody<DeleteCacheRequest>,
) -> Result<HttpResponseDeleted, HttpError> {
    helpers::delete_cache(ctx.context(), request.into_inner())?;
    Ok(HttpResponseDeleted())
}

#[endpoint { method = GET, path = "/rpki/cache" }]
pub async fn get_caches(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<VrfSelector>,
) -> Result<HttpResponseOk<Vec<CacheConfig>>, HttpError> {
    let rq = request.into_inner();
    let instance = ctx.context().rpki.get(rq.vrf.as_deref())?;
    Ok(HttpResponseOk(instance.caches.caches()))
}

#[endpoint { method = GET, path = "/rpki/prefix-table" }]
pub async fn get_prefix_table(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<PrefixTableQuery>,
) -> Result<HttpResponseOk<PrefixTable>, HttpError> {
    Ok(HttpResponseOk(helpers::prefix_table(
        ctx.context(),
        request.into_inner(),
    )?))
}

#[endpoint { method = GET, path = "/rpki/prefix" }]
pub async fn get_prefix(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<PrefixQuery>,
) -> Result<HttpResponseOk<PrefixLookup>, HttpError> {
    Ok(HttpResponseOk(helpers::lookup(
        ctx.context(),
        request.into_inner(),
    )?))
}

#[endpoint { method = GET, path = "/rpki/cache-connection" }]
pub async fn get_cache_connection(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<VrfSelector>,
) -> Result<HttpResponseOk<CacheConnectionReport>, HttpError> {
    let rq = request.into_inner();
    Ok(HttpResponseOk(helpers::cache_connection(
        ctx.context(),
        rq.vrf.as_deref(),
    )))
}

#[endpoint { method = PUT, path = "/rpki/routes" }]
pub async fn announce_routes(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: TypedBody<RoutesRequest>,
) -> Result<HttpResponseOk<Vec<RouteRpkiInfo>>, HttpError> {
    Ok(HttpResponseOk(helpers::announce(
        ctx.context(),
        request.into_inner(),
    )))
}

#[endpoint { method = DELETE, path = "/rpki/routes" }]
pub async fn withdraw_routes(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: TypedBody<RoutesRequest>,
) -> Result<HttpResponseDeleted, HttpError> {
    helpers::withdraw(ctx.context(), request.into_inner())?;
    Ok(HttpResponseDeleted())
}

#[endpoint { method = GET, path = "/rpki/routes" }]
pub async fn get_routes(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<RoutesQuery>,
) -> Result<HttpResponseOk<Vec<RouteRpkiInfo>>, HttpError> {
    Ok(HttpResponseOk(helpers::routes(
        ctx.context(),
        request.into_inner(),
    )?))
}

#[endpoint { method = PUT, path = "/rpki/import-policy" }]
pub async fn set_import_policy(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: TypedBody<ImportPolicyRequest>,
) -> Result<HttpResponseUpdatedNoContent, HttpError> {
    let rq = request.into_inner();
    let ctx = ctx.context();
    let instance = ctx.rpki.ensure(rq.vrf.as_deref());
    admin_log!(ctx.log, info, "import policy {:?}", rq.policy;
        "vrf" => instance.vrf.clone()
    );
    instance.rib.set_policy(rq.policy);
    Ok(HttpResponseUpdatedNoContent())
}

#[endpoint { method = GET, path = "/rpki/import-policy" }]
pub async fn get_import_policy(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<VrfSelector>,
) -> Result<HttpResponseOk<ImportPolicy>, HttpError> {
    let rq = request.into_inner();
    let instance = ctx.context().rpki.get(rq.vrf.as_deref())?;
    Ok(HttpResponseOk(instance.rib.policy()))
}

#[endpoint { method = GET, path = "/rpki/revalidation" }]
pub async fn get_revalidation(
    ctx: RequestContext<Arc<HandlerContext>>,
    request: Query<VrfSelector>,
) -> Result<HttpResponseOk<RevalidationStats>, HttpError> {
    let rq = request.into_inner();
    let instance = ctx.context().rpki.get(rq.vrf.as_deref())?;
    Ok(HttpResponseOk(instance.revalidator.stats()))
}

pub(crate) mod helpers {
    use super::*;
    use rpki_types::{CacheId, Prefix};
    use rtr::introspect;

    pub(crate) fn add_cache(
        ctx: &HandlerContext,
        rq: CacheRequest,
    ) -> Result<(), Error> {
        let instance = ctx.rpki.ensure(rq.vrf.as_deref());
        let config = CacheConfig::from(rq);
        admin_log!(ctx.log, info, "rpki cache {} preference {}",
            config.id(), config.preference;
            "vrf" => instance.vrf.clone()
        );
        instance.caches.add(config)?;
        Ok(())
    }

    pub(crate) fn delete_cache(
        ctx: &HandlerContext,
        rq: DeleteCacheRequest,
    ) -> Result<(), Error> {
        let instance = ctx.rpki.get(rq.vrf.as_deref())?;
        let id = CacheId::new(rq.address, rq.port.unwrap_or(RTR_PORT));
        admin_log!(ctx.log, info, "no rpki cache {id} preference {}",
            rq.preference;
            "vrf" => instance.vrf.clone()
        );
        instance.caches.remove(id, rq.preference)?;
        Ok(())
    }

    pub(crate) fn prefix_table(
        ctx: &HandlerContext,
        rq: PrefixTableQuery,
    ) -> Result<PrefixTable, Error> {
        let instance = ctx.rpki.get(rq.vrf.as_deref())?;
        Ok(introspect::prefix_table(&instance.table.snapshot(), rq.asn))
    }

    pub(crate) fn lookup(
        ctx: &HandlerContext,
        rq: PrefixQuery,
    ) -> Result<PrefixLookup, Error> {
        let instance = ctx.rpki.get(rq.vrf.as_deref())?;
        let prefix: Prefix = rq.prefix.parse().map_err(Error::BadRequest)?;
        Ok(introspect::lookup(
            &instance.table.snapshot(),
            prefix,
            rq.origin_as,
        ))
    }

    /// A VRF nobody configured has no cache connection either.
    pub(crate) fn cache_connection(
        ctx: &HandlerContext,
        vrf: Option<&str>,
    ) -> CacheConnectionReport {
        ctx.rpki.get(vrf).map_or_else(
            |_| CacheConnectionReport::no_connection(),
            |i| i.caches.connection_report(),
        )
    }

    pub(crate) fn announce(
        ctx: &HandlerContext,
        rq: RoutesRequest,
    ) -> Vec<RouteRpkiInfo> {
        let instance = ctx.rpki.ensure(rq.vrf.as_deref());
        rq.routes
            .into_iter()
            .map(|a| instance.rib.announce(a))
            .collect()
    }

    pub(crate) fn withdraw(
        ctx: &HandlerContext,
        rq: RoutesRequest,
    ) -> Result<(), Error> {
        let instance = ctx.rpki.get(rq.vrf.as_deref())?;
        for a in &rq.routes {
            instance.rib.withdraw(a);
        }
        Ok(())
    }

    pub(crate) fn routes(
        ctx: &HandlerContext,
        rq: RoutesQuery,
    ) -> Result<Vec<RouteRpkiInfo>, Error> {
        let instance = ctx.rpki.get(rq.vrf.as_deref())?;
        let routes = instance.rib.routes(rq.state);
        Ok(if rq.accepted {
            routes.into_iter().filter(|r| r.accepted).collect()
        } else {
            routes
        })
    }
}
