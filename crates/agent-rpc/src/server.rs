//! HTTP routers for the agent service contract and broker callbacks.
//!
//! `agent_service_router` exposes a hosted runtime to a remote engine;
//! `broker_service_router` is mounted by the engine so agents can reach
//! their backtest's broker. Both speak the message types in
//! [`crate::messages`] and fold errors through [`crate::status`].

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::messages::{
    AccountResponse, AgentClassesResponse, AgentStateResponse, ClosePositionRequest,
    CreateInstanceRequest, CreateInstanceResponse, Empty, HealthResponse, InstanceRequest,
    NextTickRequest, OrderResult, OrdersResponse, PairsResponse, PositionResponse,
    PositionsResponse, RegisterSourceRequest, RestoreStateRequest, SendActionRequest,
    SendActionResponse, SetPropertiesRequest, SubmitOrderRequest, TickResponse,
    UnregisterSourceRequest,
};
use crate::proxy::{AgentProxyPool, BrokerPort};
use crate::service::AgentService;
use crate::status::RpcResult;

type SharedService = Arc<dyn AgentService>;

/// Router serving the [`AgentService`] contract over HTTP.
pub fn agent_service_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sources/register", post(register_source))
        .route("/sources/unregister", post(unregister_source))
        .route("/classes", get(list_classes))
        .route("/instances", post(create_instance))
        .route("/instances/post-create", post(exec_post_create))
        .route("/instances/restore-state", post(restore_state))
        .route("/instances/delete", post(delete_instance))
        .route("/instances/state", post(instance_state))
        .route("/instances/properties", post(set_properties))
        .route("/instances/next-tick", post(next_tick))
        .route("/instances/action", post(send_action))
        .with_state(service)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn register_source(
    State(service): State<SharedService>,
    Json(request): Json<RegisterSourceRequest>,
) -> RpcResult<Json<Empty>> {
    service.register_source(&request.name, &request.body).await?;
    Ok(Json(Empty {}))
}

async fn unregister_source(
    State(service): State<SharedService>,
    Json(request): Json<UnregisterSourceRequest>,
) -> RpcResult<Json<Empty>> {
    service.unregister_source(&request.name).await?;
    Ok(Json(Empty {}))
}

async fn list_classes(
    State(service): State<SharedService>,
) -> RpcResult<Json<AgentClassesResponse>> {
    let classes = service.agent_classes().await?;
    Ok(Json(AgentClassesResponse { classes }))
}

async fn create_instance(
    State(service): State<SharedService>,
    Json(request): Json<CreateInstanceRequest>,
) -> RpcResult<Json<CreateInstanceResponse>> {
    let instance_id = service
        .create_instance(
            &request.class_name,
            request.agent_name.as_deref(),
            &request.properties,
        )
        .await?;
    Ok(Json(CreateInstanceResponse { instance_id }))
}

async fn exec_post_create(
    State(service): State<SharedService>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<Empty>> {
    service.exec_post_create(&request.instance_id).await?;
    Ok(Json(Empty {}))
}

async fn restore_state(
    State(service): State<SharedService>,
    Json(request): Json<RestoreStateRequest>,
) -> RpcResult<Json<Empty>> {
    service
        .restore_state(&request.instance_id, &request.state)
        .await?;
    Ok(Json(Empty {}))
}

async fn delete_instance(
    State(service): State<SharedService>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<Empty>> {
    service.delete_instance(&request.instance_id).await?;
    Ok(Json(Empty {}))
}

async fn instance_state(
    State(service): State<SharedService>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<AgentStateResponse>> {
    let state = service.agent_state(&request.instance_id).await?;
    Ok(Json(AgentStateResponse { state }))
}

async fn set_properties(
    State(service): State<SharedService>,
    Json(request): Json<SetPropertiesRequest>,
) -> RpcResult<Json<Empty>> {
    service
        .set_properties(&request.instance_id, &request.properties)
        .await?;
    Ok(Json(Empty {}))
}

async fn next_tick(
    State(service): State<SharedService>,
    Json(request): Json<NextTickRequest>,
) -> RpcResult<Json<Empty>> {
    service.next_tick(&request.instance_id, &request.tick).await?;
    Ok(Json(Empty {}))
}

async fn send_action(
    State(service): State<SharedService>,
    Json(request): Json<SendActionRequest>,
) -> RpcResult<Json<SendActionResponse>> {
    let message = service
        .send_action(&request.instance_id, &request.action)
        .await?;
    Ok(Json(SendActionResponse { message }))
}

/// Router serving broker callbacks, mounted by the engine.
pub fn broker_service_router(pool: Arc<AgentProxyPool>) -> Router {
    Router::new()
        .route("/broker/account", post(broker_account))
        .route("/broker/pairs", post(broker_pairs))
        .route("/broker/tick", post(broker_tick))
        .route("/broker/positions", post(broker_positions))
        .route("/broker/orders", post(broker_orders))
        .route("/broker/orders/submit", post(broker_submit_order))
        .route("/broker/positions/close", post(broker_close_position))
        .with_state(pool)
}

/// Broker bound to the instance, via the proxy pool.
async fn resolve_broker(
    pool: &AgentProxyPool,
    instance_id: &str,
) -> RpcResult<Arc<dyn BrokerPort>> {
    let proxy = pool.get(instance_id)?;
    Ok(proxy.broker().await?)
}

async fn broker_account(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<AccountResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let account = broker.account().await?;
    Ok(Json(AccountResponse { account }))
}

async fn broker_pairs(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<PairsResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let pair_names = broker.pair_names().await?;
    Ok(Json(PairsResponse { pair_names }))
}

async fn broker_tick(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<TickResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let tick = broker.current_tick().await?;
    Ok(Json(TickResponse { tick }))
}

async fn broker_positions(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<PositionsResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let positions = broker.positions().await?;
    Ok(Json(PositionsResponse { positions }))
}

async fn broker_orders(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<InstanceRequest>,
) -> RpcResult<Json<OrdersResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let orders = broker.orders().await?;
    Ok(Json(OrdersResponse { orders }))
}

async fn broker_submit_order(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<SubmitOrderRequest>,
) -> RpcResult<Json<OrderResult>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let result = broker.submit_order(request.order).await?;
    Ok(Json(result))
}

async fn broker_close_position(
    State(pool): State<Arc<AgentProxyPool>>,
    Json(request): Json<ClosePositionRequest>,
) -> RpcResult<Json<PositionResponse>> {
    let broker = resolve_broker(&pool, &request.instance_id).await?;
    let position = broker.close_position(request.position_id).await?;
    Ok(Json(PositionResponse { position }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RpcAgentService;
    use crate::host::testing::host_with_recording_class;
    use crate::proxy::{AgentProxy, MockBrokerPort};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = agent_service_router(Arc::new(host_with_recording_class()));
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_unknown_class_maps_to_404_with_status_body() {
        let router = agent_service_router(Arc::new(host_with_recording_class()));
        let response = router
            .oneshot(post_json(
                "/instances",
                json!({ "class_name": "Missing@nowhere" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "NOT_FOUND");
        assert!(body["detail"].as_str().unwrap().contains("Missing@nowhere"));
    }

    #[tokio::test]
    async fn test_instance_lifecycle_through_the_router() {
        let router = agent_service_router(Arc::new(host_with_recording_class()));

        let created = router
            .clone()
            .oneshot(post_json(
                "/instances",
                json!({ "class_name": "Recording@native", "agent_name": "rec" }),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);
        let instance_id = body_json(created).await["instance_id"]
            .as_str()
            .unwrap()
            .to_string();

        let tick = json!({
            "timestamp": "2025-06-01T00:00:00Z",
            "values": { "EURUSD": { "bid": "1.1000", "ask": "1.1003" } }
        });
        let delivered = router
            .clone()
            .oneshot(post_json(
                "/instances/next-tick",
                json!({ "instance_id": instance_id, "tick": tick }),
            ))
            .await
            .unwrap();
        assert_eq!(delivered.status(), StatusCode::OK);

        let state = router
            .clone()
            .oneshot(post_json(
                "/instances/state",
                json!({ "instance_id": instance_id }),
            ))
            .await
            .unwrap();
        assert_eq!(state.status(), StatusCode::OK);
        assert_eq!(
            body_json(state).await,
            json!({ "state": { "ticks_seen": 1 } })
        );
    }

    #[tokio::test]
    async fn test_broker_callback_resolves_through_the_pool() {
        let service: Arc<dyn AgentService> = Arc::new(host_with_recording_class());
        let pool = Arc::new(AgentProxyPool::new());

        let proxy = Arc::new(AgentProxy::new(
            "inst-1",
            "rec",
            "Recording@native",
            service,
        ));
        let mut broker = MockBrokerPort::new();
        broker
            .expect_pair_names()
            .returning(|| Ok(vec!["EURUSD".to_string()]));
        proxy.bind_broker(Arc::new(broker)).await;
        pool.insert(proxy);

        let router = broker_service_router(Arc::clone(&pool));
        let response = router
            .clone()
            .oneshot(post_json(
                "/broker/pairs",
                json!({ "instance_id": "inst-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "pair_names": ["EURUSD"] }));

        let missing = router
            .oneshot(post_json(
                "/broker/pairs",
                json!({ "instance_id": "missing" }),
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unbound_broker_maps_to_precondition_failed() {
        let service: Arc<dyn AgentService> = Arc::new(host_with_recording_class());
        let pool = Arc::new(AgentProxyPool::new());
        pool.insert(Arc::new(AgentProxy::new(
            "inst-1",
            "rec",
            "Recording@native",
            service,
        )));

        let router = broker_service_router(pool);
        let response = router
            .oneshot(post_json(
                "/broker/tick",
                json!({ "instance_id": "inst-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(body_json(response).await["status"], "FAILED_PRECONDITION");
    }

    #[tokio::test]
    async fn test_http_client_round_trip() {
        let router = agent_service_router(Arc::new(host_with_recording_class()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = RpcAgentService::new(format!("http://{}", addr));
        assert!(client.available().await);

        client
            .register_source("momentum.rs", "struct Momentum;")
            .await
            .unwrap();

        let classes = client.agent_classes().await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Recording@native");

        let instance_id = client
            .create_instance("Recording@native", Some("remote rec"), &[])
            .await
            .unwrap();
        client.exec_post_create(&instance_id).await.unwrap();

        let err = client
            .create_instance("Missing@nowhere", None, &[])
            .await
            .unwrap_err();
        assert_eq!(
            err.rpc_status(),
            tickrig_core::RpcStatus::NotFound,
            "status survives the wire: {err}"
        );

        client.delete_instance(&instance_id).await.unwrap();
    }
}
