//! HTTP endpoints of the invoice node.
//!
//! Every command is a `POST` with a JSON body named after the command
//! (`/invoice`, `/listinvoices`, `/waitinvoice`, ...). Successful commands
//! reply `200` with the result. Failed commands reply with an
//! [`ErrorResponse`] carrying the numeric command error code.
//!
//! `POST /htlc` is the intake for the channel layer: the request is held open
//! until the offered HTLC is resolved, and closing the connection early
//! invalidates the HTLC.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use invoicer_types::proto::{
    DecodePayRequest, DelExpiredInvoiceRequest, DelInvoiceRequest, ErrorResponse, HtlcRequest,
    InvoiceRequest, ListInvoicesRequest, WaitAnyInvoiceRequest, WaitInvoiceRequest,
};

use crate::node::{InvoiceError, InvoiceNode};
use crate::settlement::{FatalError, IncomingHtlc, htlc_channel};

pub fn routes() -> Router<Arc<InvoiceNode>> {
    Router::new()
        .route("/", get(get_root))
        .route("/invoice", post(post_invoice))
        .route("/listinvoices", post(post_listinvoices))
        .route("/delinvoice", post(post_delinvoice))
        .route("/delexpiredinvoice", post(post_delexpiredinvoice))
        .route("/waitinvoice", post(post_waitinvoice))
        .route("/waitanyinvoice", post(post_waitanyinvoice))
        .route("/decodepay", post(post_decodepay))
        .route("/htlc", post(post_htlc))
}

/// A fatal error means our own state or a collaborator can no longer be
/// trusted. Nothing sensible can continue.
fn abort(error: FatalError) -> ! {
    tracing::error!(error = %error, "fatal error, aborting");
    std::process::abort()
}

fn error_response(error: InvoiceError) -> Response {
    let error = match error {
        InvoiceError::Fatal(fatal) => abort(fatal),
        other => other,
    };
    let status = match error {
        InvoiceError::Gossip(_) | InvoiceError::Signing(_) | InvoiceError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    tracing::warn!(error = %error, code = error.code(), "command failed");
    let body = ErrorResponse {
        code: error.code(),
        message: error.to_string(),
        data: error.data(),
    };
    (status, Json(body)).into_response()
}

fn reply<T: serde::Serialize>(result: Result<T, InvoiceError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

/// `GET /`: identity of this node and the commands it serves.
#[instrument(skip_all)]
pub async fn get_root(State(node): State<Arc<InvoiceNode>>) -> impl IntoResponse {
    Json(json!({
        "id": node.node_id().to_string(),
        "network": node.settings().network,
        "commands": [
            "invoice",
            "listinvoices",
            "delinvoice",
            "delexpiredinvoice",
            "waitinvoice",
            "waitanyinvoice",
            "decodepay",
        ],
    }))
}

#[instrument(skip_all)]
pub async fn post_invoice(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<InvoiceRequest>,
) -> Response {
    reply(node.invoice(body).await)
}

#[instrument(skip_all)]
pub async fn post_listinvoices(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<ListInvoicesRequest>,
) -> Response {
    reply(node.listinvoices(body))
}

#[instrument(skip_all)]
pub async fn post_delinvoice(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<DelInvoiceRequest>,
) -> Response {
    reply(node.delinvoice(body))
}

#[instrument(skip_all)]
pub async fn post_delexpiredinvoice(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<DelExpiredInvoiceRequest>,
) -> Response {
    reply(node.delexpiredinvoice(body).map(|_| json!({})))
}

#[instrument(skip_all)]
pub async fn post_waitinvoice(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<WaitInvoiceRequest>,
) -> Response {
    reply(node.waitinvoice(body).await)
}

#[instrument(skip_all)]
pub async fn post_waitanyinvoice(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<WaitAnyInvoiceRequest>,
) -> Response {
    reply(node.waitanyinvoice(body).await)
}

#[instrument(skip_all)]
pub async fn post_decodepay(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<DecodePayRequest>,
) -> Response {
    reply(node.decodepay(body))
}

/// `POST /htlc`: settles an offered HTLC against our invoices.
///
/// Settlement runs on its own task. This handler only holds the owning side
/// of the HTLC, so a dropped connection is seen by settlement as an
/// invalidated HTLC.
#[instrument(skip_all, fields(payment_hash = %body.payment_hash, msat = %body.msat))]
pub async fn post_htlc(
    State(node): State<Arc<InvoiceNode>>,
    Json(body): Json<HtlcRequest>,
) -> Response {
    let (handle, owner) = htlc_channel();
    let htlc = IncomingHtlc {
        payment_hash: body.payment_hash,
        amount: body.msat,
        handle,
    };
    tokio::spawn(async move {
        if let Err(error) = node.try_pay(htlc).await {
            abort(error);
        }
    });
    match owner.resolution().await {
        Some(resolution) => (StatusCode::OK, Json(resolution)).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                code: invoicer_types::proto::error_code::LIGHTNINGD,
                message: "HTLC left unresolved".to_string(),
                data: None,
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::{channel, node_id, test_node};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        routes().with_state(Arc::new(test_node(vec![channel(node_id(2), true)], false)))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn root_describes_node() {
        let app = app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["network"], "regtest");
        assert_eq!(body["id"].as_str().unwrap().len(), 66);
    }

    #[tokio::test]
    async fn invoice_then_list() {
        let app = app();
        let (status, created) = call(
            &app,
            Method::POST,
            "/invoice",
            json!({"msatoshi": "10sat", "label": "tea", "description": "green tea"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(created["bolt11"].as_str().unwrap().starts_with("lnbcrt100n1"));

        let (status, listed) = call(&app, Method::POST, "/listinvoices", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let invoices = listed["invoices"].as_array().unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0]["label"], "tea");
        assert_eq!(invoices[0]["status"], "unpaid");
        assert_eq!(invoices[0]["amount_msat"], "10000msat");
        assert_eq!(invoices[0]["payment_hash"], created["payment_hash"]);
    }

    #[tokio::test]
    async fn command_errors_carry_codes() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/invoice",
            json!({"msatoshi": "lots", "label": "x", "description": "d"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], -32602);

        let (status, body) =
            call(&app, Method::POST, "/waitinvoice", json!({"label": "nope"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"code": -1, "message": "Label not found"}));

        let (_, body) = call(&app, Method::POST, "/decodepay", json!({"bolt11": "lnbc1"})).await;
        assert!(body["message"].as_str().unwrap().starts_with("Invalid bolt11"));
    }

    #[tokio::test]
    async fn htlc_is_fulfilled_once() {
        let app = app();
        let (_, created) = call(
            &app,
            Method::POST,
            "/invoice",
            json!({
                "msatoshi": 5000,
                "label": "paid",
                "description": "d",
                "preimage": "22".repeat(32),
            }),
        )
        .await;
        let htlc = json!({"payment_hash": created["payment_hash"], "msat": 5000});

        let (status, resolution) = call(&app, Method::POST, "/htlc", htlc.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            resolution,
            json!({"result": "fulfill", "payment_preimage": "22".repeat(32)})
        );

        let (_, resolution) = call(&app, Method::POST, "/htlc", htlc).await;
        assert_eq!(resolution, json!({"result": "fail", "failure_code": 0x400f}));

        let (_, paid) = call(&app, Method::POST, "/waitanyinvoice", json!({})).await;
        assert_eq!(paid["label"], "paid");
        assert_eq!(paid["pay_index"], 1);
    }

    #[tokio::test]
    async fn delete_commands() {
        let app = app();
        call(
            &app,
            Method::POST,
            "/invoice",
            json!({"msatoshi": "any", "label": "gone", "description": "d"}),
        )
        .await;
        let (status, deleted) = call(
            &app,
            Method::POST,
            "/delinvoice",
            json!({"label": "gone", "status": "unpaid"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["label"], "gone");

        let (status, body) = call(&app, Method::POST, "/delexpiredinvoice", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }
}
