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

//! Integration tests for space sharing: view versus full grants, what non-members can(not) see,
//! and who may re-share.

use axum::http::StatusCode;
use serde_json::json;

use gridconsole::{
    clusters::ClustersRsp,
    entities::{AccountId, ClusterId, Permission},
    spaces::SpacesRsp,
};
use gridconsole_test::{
    call, call_json, get, personal_space, post, register_and_login, used_by, Result,
};

const PASSWORD: &str = "f00 b@r sp1at";

/// Alice, with a cluster in her personal space, & Bob, with none
struct Fixture {
    router: axum::Router,
    alice_token: String,
    alice_space: gridconsole::entities::SpaceId,
    bob_token: String,
    bob_id: AccountId,
    cluster: ClusterId,
}

async fn fixture() -> Result<Fixture> {
    let router = gridconsole_test::make_test_router();

    let alice = register_and_login(&router, "alice@gmail.com", "alice", PASSWORD).await?;
    let bob = register_and_login(&router, "bob@gmail.com", "bob", PASSWORD).await?;

    let alice_space = personal_space(&router, &alice.token).await?.id();
    let (status, rsp) = call_json::<ClustersRsp>(
        &router,
        post(
            "/rest/clusters/save",
            Some(&alice.token),
            &json!({"space": alice_space, "name": "edge"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    Ok(Fixture {
        cluster: rsp.clusters[0].id(),
        router,
        alice_token: alice.token,
        alice_space,
        bob_token: bob.token,
        bob_id: bob.account.id,
    })
}

/// Share Alice's personal space with Bob at the given permission
async fn share(fx: &Fixture, permission: Permission) -> Result<()> {
    let (status, _) = call_json::<SpacesRsp>(
        &fx.router,
        post(
            "/rest/spaces/save",
            Some(&fx.alice_token),
            &json!({
                "_id": fx.alice_space,
                "name": "Personal space",
                "usedBy": used_by(&[(fx.bob_id, permission)])?,
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    Ok(())
}

#[tokio::test]
async fn test_unshared_spaces_are_invisible() -> Result<()> {
    let fx = fixture().await?;

    // Bob sees only his own, empty, personal space
    let (status, rsp) =
        call_json::<ClustersRsp>(&fx.router, get("/rest/clusters", Some(&fx.bob_token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.spaces.len());
    assert!(rsp.clusters.is_empty());

    // Bob removing Alice's cluster draws a 404, not a 403: no confirming its existence
    let (status, _) = call(
        &fx.router,
        post(
            "/rest/clusters/remove",
            Some(&fx.bob_token),
            &json!({"_id": fx.cluster}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::NOT_FOUND, status);

    Ok(())
}

#[tokio::test]
async fn test_view_grant_is_read_only() -> Result<()> {
    let fx = fixture().await?;
    share(&fx, Permission::View).await?;

    // Bob now sees Alice's space & its cluster
    let (status, rsp) =
        call_json::<ClustersRsp>(&fx.router, get("/rest/clusters", Some(&fx.bob_token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(2, rsp.spaces.len());
    assert_eq!(1, rsp.clusters.len());
    assert_eq!(fx.cluster, rsp.clusters[0].id());

    // ...but cannot write into it
    let (status, _) = call(
        &fx.router,
        post(
            "/rest/clusters/save",
            Some(&fx.bob_token),
            &json!({"space": fx.alice_space, "name": "rogue"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::FORBIDDEN, status);

    // ...nor remove from it; the cluster is visible, so this one's an honest 403
    let (status, _) = call(
        &fx.router,
        post(
            "/rest/clusters/remove",
            Some(&fx.bob_token),
            &json!({"_id": fx.cluster}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::FORBIDDEN, status);

    Ok(())
}

#[tokio::test]
async fn test_full_grant_allows_writes() -> Result<()> {
    let fx = fixture().await?;
    share(&fx, Permission::Full).await?;

    let (status, rsp) = call_json::<ClustersRsp>(
        &fx.router,
        post(
            "/rest/clusters/save",
            Some(&fx.bob_token),
            &json!({"space": fx.alice_space, "name": "core"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(2, rsp.clusters.len());

    // Alice sees Bob's handiwork
    let (status, rsp) =
        call_json::<ClustersRsp>(&fx.router, get("/rest/clusters", Some(&fx.alice_token))?)
            .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        vec!["core", "edge"],
        rsp.clusters.iter().map(|c| c.name()).collect::<Vec<_>>()
    );

    // And Bob may remove what Alice made
    let (status, _) = call(
        &fx.router,
        post(
            "/rest/clusters/remove",
            Some(&fx.bob_token),
            &json!({"_id": fx.cluster}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    Ok(())
}

#[tokio::test]
async fn test_only_the_owner_reshapes_a_space() -> Result<()> {
    let fx = fixture().await?;
    share(&fx, Permission::Full).await?;

    // Even a full grant doesn't let Bob rename or re-share Alice's space
    let (status, _) = call(
        &fx.router,
        post(
            "/rest/spaces/save",
            Some(&fx.bob_token),
            &json!({"_id": fx.alice_space, "name": "bob's now"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::FORBIDDEN, status);

    // Dropping the share map revokes Bob
    let (status, _) = call_json::<SpacesRsp>(
        &fx.router,
        post(
            "/rest/spaces/save",
            Some(&fx.alice_token),
            &json!({"_id": fx.alice_space, "name": "Personal space"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    let (status, rsp) =
        call_json::<ClustersRsp>(&fx.router, get("/rest/clusters", Some(&fx.bob_token))?).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, rsp.spaces.len());
    assert!(rsp.clusters.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_grants_must_name_known_accounts() -> Result<()> {
    let fx = fixture().await?;

    let (status, _) = call(
        &fx.router,
        post(
            "/rest/spaces/save",
            Some(&fx.alice_token),
            &json!({
                "_id": fx.alice_space,
                "name": "Personal space",
                "usedBy": used_by(&[(AccountId::new(), Permission::View)])?,
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    Ok(())
}

#[tokio::test]
async fn test_owner_grants_are_dropped() -> Result<()> {
    let fx = fixture().await?;

    // Alice "sharing" her own space with herself (say, at VIEW) must not demote her
    let alice_id = {
        let (status, rsp) = call_json::<SpacesRsp>(
            &fx.router,
            get("/rest/spaces", Some(&fx.alice_token))?,
        )
        .await?;
        assert_eq!(StatusCode::OK, status);
        rsp.spaces[0].owner()
    };

    let (status, rsp) = call_json::<SpacesRsp>(
        &fx.router,
        post(
            "/rest/spaces/save",
            Some(&fx.alice_token),
            &json!({
                "_id": fx.alice_space,
                "name": "Personal space",
                "usedBy": used_by(&[(alice_id, Permission::View)])?,
            }),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert!(rsp.spaces[0].used_by().is_empty());

    // Still the owner: still able to write
    let (status, _) = call_json::<ClustersRsp>(
        &fx.router,
        post(
            "/rest/clusters/save",
            Some(&fx.alice_token),
            &json!({"space": fx.alice_space, "name": "core"}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);

    Ok(())
}
