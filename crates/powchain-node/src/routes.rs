use crate::error::ApiError;
use crate::stream;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use powchain_core::{Block, ChainSnapshot, Ledger, Transaction};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Head {
    height: u64,
    index: u64,
    hash: String,
    mining: bool,
}

#[derive(Serialize)]
struct Validation {
    valid: bool,
    height: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    amount: f64,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/chain/validate", get(validate))
        .route("/blocks/{index}", get(block))
        .route("/search", get(search))
        .route("/mempool", get(mempool))
        .route("/transactions/new", post(new_transaction))
        .route("/mine", get(mine).post(mine))
        .route("/mine/stream", get(stream::mine_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    Json(state.ledger.snapshot())
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let tip = state.ledger.last_block();
    Json(Head {
        height: tip.index() + 1,
        index: tip.index(),
        hash: tip.hash().to_string(),
        mining: state.ledger.is_mining(),
    })
}

async fn validate(State(state): State<AppState>) -> Json<Validation> {
    let height = state.ledger.height();
    let error = match state.ledger.validate() {
        Ok(()) => None,
        Err(err) => Some(err.to_string()),
    };
    Json(Validation {
        valid: error.is_none(),
        height,
        error,
    })
}

async fn block(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.ledger.find_block(index)?))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Block>>, ApiError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::malformed("query parameter `q` is required"))?;
    Ok(Json(state.ledger.search(&query)))
}

async fn mempool(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.ledger.pending())
}

async fn new_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TxIn>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let Json(tx) = payload.map_err(|rejection| ApiError::malformed(rejection.body_text()))?;
    if tx.sender.trim().is_empty() || tx.recipient.trim().is_empty() {
        return Err(ApiError::malformed("sender and recipient are required"));
    }
    if !tx.amount.is_finite() {
        return Err(ApiError::malformed("amount must be a finite number"));
    }
    let tx = state
        .ledger
        .submit_transaction(tx.sender, tx.recipient, tx.amount);
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn mine(State(state): State<AppState>) -> Result<Json<Block>, ApiError> {
    let ledger = state.ledger.clone();
    let block = tokio::task::spawn_blocking(move || ledger.mine())
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;
    info!(index = block.index(), proof = block.proof(), "block mined via /mine");
    Ok(Json(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use powchain_core::pow::valid_proof;
    use powchain_core::LedgerConfig;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(difficulty: usize) -> (Router, Ledger) {
        let ledger = Ledger::new(
            LedgerConfig::default()
                .with_difficulty(difficulty)
                .with_pace(Duration::ZERO),
        );
        (
            router(AppState {
                ledger: ledger.clone(),
            }),
            ledger,
        )
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        serde_json::from_str(&body_text(resp).await).unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let (app, _) = app(1);
        let resp = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn submit_then_list_mempool() {
        let (app, ledger) = app(1);
        let resp = app
            .clone()
            .oneshot(post_json(
                "/transactions/new",
                r#"{"sender":"alice","recipient":"bob","amount":10}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["sender"], "alice");

        let resp = app.oneshot(get_req("/mempool")).await.unwrap();
        let pending = body_json(resp).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[tokio::test]
    async fn malformed_transactions_rejected() {
        let (app, ledger) = app(1);
        for body in [
            r#"{"sender":"alice","recipient":"bob"}"#,
            r#"{"sender":"","recipient":"bob","amount":1}"#,
            r#"{"sender":"alice","recipient":"bob","amount":"ten"}"#,
            "not json",
        ] {
            let resp = app
                .clone()
                .oneshot(post_json("/transactions/new", body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(body_json(resp).await["error"].is_string());
        }
        assert!(ledger.pending().is_empty());
    }

    #[tokio::test]
    async fn mine_and_fetch_block() {
        let (app, ledger) = app(2);
        ledger.submit_transaction("alice", "bob", 10.0);
        let resp = app.clone().oneshot(get_req("/mine")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let block = body_json(resp).await;
        assert_eq!(block["index"], 1);
        assert_eq!(block["transactions"][0]["recipient"], "bob");
        assert!(block["miningStats"]["attempts"].as_u64().unwrap() >= 1);

        let resp = app.clone().oneshot(get_req("/blocks/1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["hash"], block["hash"]);

        let resp = app.clone().oneshot(get_req("/blocks/99")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app.clone().oneshot(get_req("/chain/validate")).await.unwrap();
        let validation = body_json(resp).await;
        assert_eq!(validation["valid"], true);
        assert_eq!(validation["height"], 2);

        let resp = app.oneshot(get_req("/chain/head")).await.unwrap();
        let head = body_json(resp).await;
        assert_eq!(head["index"], 1);
        assert_eq!(head["hash"], block["hash"]);
    }

    #[tokio::test]
    async fn chain_snapshot_shape() {
        let (app, ledger) = app(1);
        ledger.submit_transaction("alice", "bob", 1.0);
        let resp = app.oneshot(get_req("/chain")).await.unwrap();
        let snapshot = body_json(resp).await;
        assert_eq!(snapshot["blocks"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["blocks"][0]["previousHash"], "0");
        assert_eq!(snapshot["pendingTransactions"][0]["amount"], 1.0);
    }

    #[tokio::test]
    async fn search_requires_query() {
        let (app, ledger) = app(1);
        ledger.submit_transaction("alice", "bob", 10.0);
        ledger.mine().unwrap();

        let resp = app.clone().oneshot(get_req("/search")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.clone().oneshot(get_req("/search?q=ALICE")).await.unwrap();
        let blocks = body_json(resp).await;
        assert_eq!(blocks.as_array().unwrap().len(), 1);
        assert_eq!(blocks[0]["index"], 1);

        let resp = app.oneshot(get_req("/search?q=nobody")).await.unwrap();
        assert!(body_json(resp).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mine_conflicts_with_running_session() {
        let (app, ledger) = app(6);
        let session = ledger.start_session().unwrap();
        let resp = app.clone().oneshot(get_req("/mine")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = app.oneshot(get_req("/mine/stream")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        drop(session);
    }

    #[tokio::test]
    async fn stream_reports_every_attempt() {
        let (app, ledger) = app(1);
        ledger.submit_transaction("alice", "bob", 10.0);
        let resp = app.oneshot(get_req("/mine/stream")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/event-stream"
        );

        let body = body_text(resp).await;
        let events: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        assert!(events.len() >= 2);
        for (k, event) in events[..events.len() - 1].iter().enumerate() {
            assert_eq!(event["attempt"], k as u64);
            assert_eq!(event["blockIndex"], 1);
        }
        let last = events.last().unwrap();
        assert_eq!(last["found"], true);
        assert_eq!(last["message"], "Block mined and added to chain.");
        let proof = last["proof"].as_u64().unwrap();
        assert!(valid_proof(100, proof, 1));

        assert_eq!(ledger.height(), 2);
        assert_eq!(ledger.find_block(1).unwrap().proof(), proof);
        assert!(ledger.pending().is_empty());
    }
}
