//! Run delivery: drive an executor, frame its events as SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::header;
use axum::response::Response;
use braid::wire::{
    agent_done_frame, agent_event_to_wire, multiagent_done_frame, multiagent_event_to_wire,
};
use braid::{Agent, Graph, InvokeOptions, MultiAgentEvent, Swarm};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wire_event::{sse_frame, EnvelopeState, ErrorFrame, DONE_EVENT, ERROR_EVENT};

use crate::app::AppState;

/// What this server runs.
#[derive(Clone)]
pub enum RunTarget {
    Agent(Arc<Agent>),
    Swarm(Arc<Swarm>),
    Graph(Arc<Graph>),
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub prompt: String,
}

pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Response {
    let run_id = uuid::Uuid::new_v4().to_string();
    let (frame_tx, frame_rx) = mpsc::channel::<Result<String, Infallible>>(64);
    let target = state.target.clone();
    debug!(run_id = %run_id, "starting run");
    tokio::spawn(run_to_frames(run_id, target, request.prompt, frame_tx));

    let body = Body::from_stream(ReceiverStream::new(frame_rx));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static response parts")
}

/// Drives one run and pushes SSE frames into `frame_tx`. A failed send means
/// the client went away; the run's cancellation token fires and the task
/// winds down at the next suspension point.
pub(crate) async fn run_to_frames(
    run_id: String,
    target: RunTarget,
    prompt: String,
    frame_tx: mpsc::Sender<Result<String, Infallible>>,
) {
    let cancellation = CancellationToken::new();
    let options = InvokeOptions {
        cancellation: cancellation.clone(),
        ..InvokeOptions::default()
    };
    let mut envelope = EnvelopeState::new(run_id.clone());

    match target {
        RunTarget::Agent(agent) => {
            let (event_tx, mut event_rx) = mpsc::channel(64);
            let forward = async {
                while let Some(event) = event_rx.recv().await {
                    let wire = match agent_event_to_wire(&event) {
                        Ok(wire) => wire,
                        Err(e) => {
                            warn!(error = %e, "dropping unserializable event");
                            continue;
                        }
                    };
                    if !send_frame(&frame_tx, &mut envelope, None, &wire).await {
                        cancellation.cancel();
                        break;
                    }
                }
            };
            let run = agent.stream(prompt, options, event_tx);
            let (outcome, ()) = tokio::join!(run, forward);
            match outcome {
                Ok(result) => {
                    let frame = agent_done_frame(&run_id, &result);
                    let data = serde_json::to_value(&frame).unwrap_or_else(|_| json!({}));
                    let _ = frame_tx.send(Ok(sse_frame(DONE_EVENT, &data))).await;
                }
                Err(e) => {
                    send_error(&frame_tx, &run_id, &e).await;
                }
            }
        }
        RunTarget::Swarm(swarm) => {
            let (event_tx, event_rx) = mpsc::channel(64);
            let run = swarm.stream(prompt, options, event_tx);
            multiagent_to_frames(run_id, run, event_rx, frame_tx, cancellation, envelope).await;
        }
        RunTarget::Graph(graph) => {
            let (event_tx, event_rx) = mpsc::channel(64);
            let run = graph.stream(prompt, options, event_tx);
            multiagent_to_frames(run_id, run, event_rx, frame_tx, cancellation, envelope).await;
        }
    }
}

async fn multiagent_to_frames<F>(
    run_id: String,
    run: F,
    mut event_rx: mpsc::Receiver<MultiAgentEvent>,
    frame_tx: mpsc::Sender<Result<String, Infallible>>,
    cancellation: CancellationToken,
    mut envelope: EnvelopeState,
) where
    F: std::future::Future<Output = Result<braid::MultiAgentResult, braid::Error>>,
{
    let forward = async {
        while let Some(event) = event_rx.recv().await {
            let node_id = event.node_id().map(str::to_string);
            let wire = match multiagent_event_to_wire(&event) {
                Ok(Some(wire)) => wire,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable event");
                    continue;
                }
            };
            if !send_frame(&frame_tx, &mut envelope, node_id.as_deref(), &wire).await {
                cancellation.cancel();
                break;
            }
        }
    };
    let (outcome, ()) = tokio::join!(run, forward);
    match outcome {
        Ok(result) => {
            let frame = multiagent_done_frame(&run_id, &result);
            let data = serde_json::to_value(&frame).unwrap_or_else(|_| json!({}));
            let _ = frame_tx.send(Ok(sse_frame(DONE_EVENT, &data))).await;
        }
        Err(e) => {
            send_error(&frame_tx, &run_id, &e).await;
        }
    }
}

async fn send_frame(
    frame_tx: &mpsc::Sender<Result<String, Infallible>>,
    envelope: &mut EnvelopeState,
    node_id: Option<&str>,
    wire: &wire_event::WireEvent,
) -> bool {
    let mut data = match wire.to_value() {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "dropping unserializable frame");
            return true;
        }
    };
    envelope.next(node_id).inject_into(&mut data);
    frame_tx
        .send(Ok(sse_frame(wire.event_name(), &data)))
        .await
        .is_ok()
}

async fn send_error(
    frame_tx: &mpsc::Sender<Result<String, Infallible>>,
    run_id: &str,
    error: &braid::Error,
) {
    let frame = ErrorFrame {
        run_id: Some(run_id.to_string()),
        message: error.to_string(),
        kind: Some(error.kind().to_string()),
    };
    let data = serde_json::to_value(&frame).unwrap_or_else(|_| json!({"message": "error"}));
    let _ = frame_tx.send(Ok(sse_frame(ERROR_EVENT, &data))).await;
}
