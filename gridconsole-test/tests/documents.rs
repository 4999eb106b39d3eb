// Copyright (C) 2025 gridconsole developers
//
// This file is part of gridconsole.
//
// gridconsole is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gridconsole is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gridconsole.  If
// not, see <http://www.gnu.org/licenses/>.

//! Integration tests for the clusters & caches APIs: save (insert & update), remove, and the
//! referential rules between the two.

use axum::http::StatusCode;
use serde_json::json;

use gridconsole::{
    caches::CachesRsp,
    clusters::ClustersRsp,
    entities::{CacheAtomicity, CacheMode, ClusterId, DiscoveryKind},
    spaces::SpacesRsp,
};
use gridconsole_test::{
    call, call_json, get, personal_space, post, register_and_login, Result,
};

const PASSWORD: &str = "f00 b@r sp1at";

#[tokio::test]
async fn test_cluster_save_and_list() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (status, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({
                "space": space.id(),
                "name": "edge",
                "discovery": {"kind": "Vm", "addresses": ["10.0.0.1:47500"]},
                "pubPoolSize": 16,
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.clusters.len());
    let cluster = &rsp.clusters[0];
    assert_eq!("edge", cluster.name());
    assert_eq!(space.id(), cluster.space());
    assert_eq!(DiscoveryKind::Vm, cluster.discovery().kind);
    assert_eq!(vec!["10.0.0.1:47500".to_owned()], cluster.discovery().addresses);
    assert_eq!(16, cluster.pub_pool_size());
    // Pool sizes not given default to zero, i.e. "let the product decide"
    assert_eq!(0, cluster.sys_pool_size());
    assert_eq!(0, cluster.mgmt_pool_size());
    assert_eq!(0, cluster.p2p_pool_size());

    // Discovery itself may be omitted; it defaults to multicast
    let (status, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "core"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    // Listings come back sorted by name, together with the caller's spaces
    assert_eq!(
        vec!["core", "edge"],
        rsp.clusters.iter().map(|c| c.name()).collect::<Vec<_>>()
    );
    assert_eq!(DiscoveryKind::Multicast, rsp.clusters[0].discovery().kind);
    assert_eq!(1, rsp.spaces.len());

    let (status, listed) =
        call_json::<ClustersRsp>(&router, get("/rest/clusters", Some(&login.token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(rsp.clusters, listed.clusters);

    Ok(())
}

#[tokio::test]
async fn test_cluster_update() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let id = rsp.clusters[0].id();

    // A save with an "_id" replaces the named document rather than creating a new one
    let (status, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"_id": id, "space": space.id(), "name": "renamed", "pubPoolSize": 32}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.clusters.len());
    assert_eq!("renamed", rsp.clusters[0].name());
    assert_eq!(32, rsp.clusters[0].pub_pool_size());

    // An "_id" naming nothing is a 404, not an upsert
    let (status, _) = call(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"_id": ClusterId::new(), "space": space.id(), "name": "ghost"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::NOT_FOUND, status);

    Ok(())
}

#[tokio::test]
async fn test_cluster_remove() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let id = rsp.clusters[0].id();

    let (status, rsp) = call_json::<ClustersRsp>(
        &router,
        post("/rest/clusters/remove", Some(&login.token), &json!({"_id": id}))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert!(rsp.clusters.is_empty());

    // Removing it a second time is a 404
    let (status, _) = call(
        &router,
        post("/rest/clusters/remove", Some(&login.token), &json!({"_id": id}))?,
    )
    .await?;
    assert_eq!(StatusCode::NOT_FOUND, status);

    Ok(())
}

#[tokio::test]
async fn test_cache_save_and_remove() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let cluster = rsp.clusters[0].id();

    let (status, rsp) = call_json::<CachesRsp>(
        &router,
        post(
            "/rest/caches/save",
            Some(&login.token),
            &json!({
                "space": space.id(),
                "name": "sessions",
                "mode": "PARTITIONED",
                "backups": 1,
                "atomicity": "ATOMIC",
                "clusters": [cluster],
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.caches.len());
    let cache = &rsp.caches[0];
    assert_eq!("sessions", cache.name());
    assert_eq!(CacheMode::Partitioned, cache.mode());
    assert_eq!(1, cache.backups());
    assert_eq!(CacheAtomicity::Atomic, cache.atomicity());
    assert!(cache.clusters().contains(&cluster));
    let id = cache.id();

    let (status, rsp) = call_json::<CachesRsp>(
        &router,
        post("/rest/caches/remove", Some(&login.token), &json!({"_id": id}))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert!(rsp.caches.is_empty());

    let (status, _) = call(
        &router,
        post("/rest/caches/remove", Some(&login.token), &json!({"_id": id}))?,
    )
    .await?;
    assert_eq!(StatusCode::NOT_FOUND, status);

    Ok(())
}

#[tokio::test]
async fn test_removing_a_cluster_detaches_it_from_caches() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let cluster = rsp.clusters[0].id();

    let (_, _) = call_json::<CachesRsp>(
        &router,
        post(
            "/rest/caches/save",
            Some(&login.token),
            &json!({
                "space": space.id(),
                "name": "sessions",
                "mode": "REPLICATED",
                "atomicity": "TRANSACTIONAL",
                "clusters": [cluster],
            }),
        )?,
    )
    .await?;

    let (status, _) = call(
        &router,
        post("/rest/clusters/remove", Some(&login.token), &json!({"_id": cluster}))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    // The cache survives, sans the dangling reference
    let (status, rsp) =
        call_json::<CachesRsp>(&router, get("/rest/caches", Some(&login.token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.caches.len());
    assert!(rsp.caches[0].clusters().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_moving_a_cluster_detaches_it_from_the_old_spaces_caches() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    let (_, spaces) = call_json::<SpacesRsp>(
        &router,
        post("/rest/spaces/save", Some(&login.token), &json!({"name": "staging"}))?,
    )
    .await?;
    let staging = spaces
        .spaces
        .iter()
        .find(|s| s.name() == "staging")
        .map(|s| s.id())
        .ok_or("staging space missing")?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let cluster = rsp.clusters[0].id();

    let (_, _) = call_json::<CachesRsp>(
        &router,
        post(
            "/rest/caches/save",
            Some(&login.token),
            &json!({
                "space": space.id(),
                "name": "sessions",
                "mode": "PARTITIONED",
                "backups": 1,
                "atomicity": "ATOMIC",
                "clusters": [cluster],
            }),
        )?,
    )
    .await?;

    // Re-home "edge" to staging; the cache stays behind & may no longer name it
    let (status, _) = call(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"_id": cluster, "space": staging, "name": "edge"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    let (status, rsp) =
        call_json::<CachesRsp>(&router, get("/rest/caches", Some(&login.token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.caches.len());
    assert!(rsp.caches[0].clusters().is_empty());

    // With no stale reference left dangling, removing "edge" changes nothing for the cache
    let (status, _) = call(
        &router,
        post("/rest/clusters/remove", Some(&login.token), &json!({"_id": cluster}))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    let (_, rsp) =
        call_json::<CachesRsp>(&router, get("/rest/caches", Some(&login.token))?).await?;
    assert!(rsp.caches[0].clusters().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_cache_cluster_references_are_checked() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;
    let space = personal_space(&router, &login.token).await?;

    // A cluster that doesn't exist
    let (status, _) = call(
        &router,
        post(
            "/rest/caches/save",
            Some(&login.token),
            &json!({
                "space": space.id(),
                "name": "sessions",
                "mode": "LOCAL",
                "atomicity": "ATOMIC",
                "clusters": [ClusterId::new()],
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    // A cluster that exists, but in another space
    let (status, spaces) = call_json::<SpacesRsp>(
        &router,
        post("/rest/spaces/save", Some(&login.token), &json!({"name": "staging"}))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    let staging = spaces
        .spaces
        .iter()
        .find(|s| s.name() == "staging")
        .map(|s| s.id())
        .ok_or("staging space missing")?;

    let (_, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": space.id(), "name": "edge"}),
        )?,
    )
    .await?;
    let cluster = rsp.clusters[0].id();

    let (status, _) = call(
        &router,
        post(
            "/rest/caches/save",
            Some(&login.token),
            &json!({
                "space": staging,
                "name": "sessions",
                "mode": "LOCAL",
                "atomicity": "ATOMIC",
                "clusters": [cluster],
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    Ok(())
}

#[tokio::test]
async fn test_saving_into_an_unknown_space_is_a_bad_reference() -> Result<()> {
    let router = gridconsole_test::make_test_router();
    let login = register_and_login(&router, "jdoe@gmail.com", "johndoe", PASSWORD).await?;

    let (status, _) = call(
        &router,
        post(
            "/rest/clusters/save",
            Some(&login.token),
            &json!({"space": gridconsole::entities::SpaceId::new(), "name": "edge"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    Ok(())
}
