//! Minimal HTTP surface for a rendering layer: read the item snapshot,
//! query the current price, trigger the dispatcher actions.

use crate::auction::{Amount, ItemId};
use crate::service::dispatch::{ActionError, NewItem, SharedDispatcher};
use crate::service::ledger::Receipt;
use crate::service::LoopService;
use crate::store::ItemView;
use anyhow::{format_err, Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

#[derive(Deserialize)]
struct BidBody {
    amount: Amount,
}

#[derive(Serialize)]
struct ReceiptBody {
    receipt: String,
}

#[derive(Serialize)]
struct PriceBody {
    price: Amount,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn fail<T>(status: StatusCode, err: impl ToString) -> ApiResult<T> {
    Err((
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    ))
}

fn action_status(err: &ActionError) -> StatusCode {
    match err {
        ActionError::NotEligible(_) => StatusCode::FORBIDDEN,
        ActionError::RemoteRejected(_) => StatusCode::CONFLICT,
        ActionError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Run a blocking dispatcher action off the async worker and translate the
/// outcome taxonomy into a response.
async fn run_action<F>(f: F) -> ApiResult<ReceiptBody>
where
    F: FnOnce() -> std::result::Result<Receipt, ActionError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Err(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, "action task failed"),
        Ok(Err(err)) => fail(action_status(&err), err),
        Ok(Ok(receipt)) => Ok(Json(ReceiptBody { receipt: receipt.0 })),
    }
}

async fn list_items(State(dispatcher): State<SharedDispatcher>) -> Json<Vec<ItemView>> {
    Json(dispatcher.snapshot())
}

async fn current_price(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
) -> ApiResult<PriceBody> {
    match tokio::task::spawn_blocking(move || dispatcher.current_price(id)).await {
        Err(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, "query task failed"),
        Ok(Err(err)) => fail(action_status(&err), err),
        Ok(Ok(price)) => Ok(Json(PriceBody { price })),
    }
}

async fn submit_item(
    State(dispatcher): State<SharedDispatcher>,
    Json(body): Json<NewItem>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.submit_item(body)).await
}

async fn start_secret_bid_phase(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.start_secret_bid_phase(id)).await
}

async fn submit_secret_bid(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
    Json(body): Json<BidBody>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.submit_secret_bid(id, body.amount)).await
}

async fn end_secret_bid_start_open_bid(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.end_secret_bid_start_open_bid(id)).await
}

async fn settle_open_bid(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
    Json(body): Json<BidBody>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.settle_open_bid(id, body.amount)).await
}

async fn end_open_bid(
    State(dispatcher): State<SharedDispatcher>,
    Path(id): Path<ItemId>,
) -> ApiResult<ReceiptBody> {
    run_action(move || dispatcher.end_open_bid(id)).await
}

fn router(dispatcher: SharedDispatcher) -> Router {
    Router::new()
        .route("/items", get(list_items).post(submit_item))
        .route("/items/:id/price", get(current_price))
        .route("/items/:id/secret-phase", post(start_secret_bid_phase))
        .route("/items/:id/secret-bid", post(submit_secret_bid))
        .route("/items/:id/open-phase", post(end_secret_bid_start_open_bid))
        .route("/items/:id/settle", post(settle_open_bid))
        .route("/items/:id/end", post(end_open_bid))
        .with_state(dispatcher)
}

async fn run_http_server(listen: SocketAddr, dispatcher: SharedDispatcher) -> Result<()> {
    axum::Server::try_bind(&listen)?
        .serve(router(dispatcher).into_make_service())
        .await?;

    Ok(())
}

pub struct Ui {
    // cancels all tasks on drop
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

impl Ui {
    pub fn new(listen: SocketAddr, dispatcher: SharedDispatcher) -> Result<Self> {
        let runtime = Runtime::new()?;

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            let res = run_http_server(listen, dispatcher)
                .await
                .with_context(|| format!("failed to run the http server on {listen}"));
            let _ = tx.send(res);
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for Ui {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("ui server died without leaving a response?!"))
            }
        }
    }
}
