use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use squish_vid_core::error::AppError;
use squish_vid_core::session::CompressionEvent;
use squish_vid_core::settings::SidecarSettings;
use squish_vid_core::sidecar_api::{SessionUpdate, SidecarContext};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectParams {
    input_path: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MediaCancelParams {
    job_id: Option<u64>,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn emit_job_progress(writer: &SharedWriter, job_id: u64, progress: f64, bytes_written: u64) {
    emit_rpc_event(
        writer,
        "media.job.progress",
        json!({
            "jobId": job_id,
            "progress": progress,
            "bytesWritten": bytes_written,
        }),
    );
}

fn emit_job_error(writer: &SharedWriter, job_id: u64, error: &RpcErrorPayload) {
    emit_rpc_event(
        writer,
        "media.job.error",
        json!({
            "jobId": job_id,
            "summary": error.summary,
            "detail": error.detail,
        }),
    );
}

fn emit_job_complete(writer: &SharedWriter, job_id: u64) {
    emit_rpc_event(writer, "media.job.complete", json!({ "jobId": job_id }));
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::Aborted => RpcErrorPayload {
            summary: "Aborted".to_string(),
            detail: "Aborted".to_string(),
        },
        AppError::FfmpegFailed { code, stderr } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::FfmpegFailed { code, stderr } => {
            let parsed = squish_vid_core::ffmpeg::parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::invalid_request(format!("Invalid params payload: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

fn is_async_request(method: &str) -> bool {
    method == "media.compress"
}

fn dispatch_sync(method: &str, params: Value, ctx: &SidecarContext) -> Result<Value, AppError> {
    match method {
        "app.capabilities" => to_result_value(ctx.app_capabilities(), "app capabilities"),
        "session.select" => {
            let parsed: SelectParams = params_from_value(params)?;
            to_result_value(ctx.select(parsed.input_path)?, "session")
        }
        "session.update" => {
            let update: SessionUpdate = params_from_value(params)?;
            to_result_value(ctx.update(update)?, "session")
        }
        "session.state" => to_result_value(ctx.state(), "session"),
        "session.reset" => to_result_value(ctx.reset()?, "session"),
        "media.cancel" => {
            let parsed: MediaCancelParams = if params.is_null() {
                MediaCancelParams::default()
            } else {
                params_from_value(params)?
            };
            to_result_value(ctx.cancel(parsed.job_id)?, "cancel result")
        }
        _ => Err(AppError::invalid_request(format!("Unknown method: {}", method))),
    }
}

fn write_response(writer: &SharedWriter, id: u64, result: Result<Value, AppError>) {
    let response = match result {
        Ok(result) => serde_json::to_value(RpcSuccess { id, result })
            .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => serde_json::to_value(RpcFailure {
            id,
            error: parse_error_payload(&err),
        })
        .map_err(|e| io::Error::other(format!("serialize failure: {}", e))),
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(writer, &failure);
        }
    }
}

fn write_failure(writer: &SharedWriter, id: u64, error: RpcErrorPayload) {
    let _ = write_json_line_shared(writer, &RpcFailure { id, error });
}

fn handle_sync_request(request: RpcRequest, writer: &SharedWriter, ctx: &SidecarContext) {
    let result = dispatch_sync(&request.method, request.params, ctx);
    write_response(writer, request.id, result);
}

fn handle_async_compress(request: RpcRequest, writer: &SharedWriter, ctx: &SidecarContext) {
    let writer_for_events = Arc::clone(writer);
    let outcome = ctx.compress_with_events(move |event| {
        if let CompressionEvent::Progress {
            job_id,
            progress,
            bytes_written,
        } = event
        {
            emit_job_progress(&writer_for_events, *job_id, *progress, *bytes_written);
        }
    });

    match outcome {
        Ok(CompressionEvent::Completed {
            job_id,
            output,
            size_bytes,
            saved_bytes,
        }) => {
            emit_job_complete(writer, job_id);
            let result = json!({
                "jobId": job_id,
                "outputPath": output,
                "sizeBytes": size_bytes,
                "savedBytes": saved_bytes,
                "session": ctx.state(),
            });
            write_response(writer, request.id, Ok(result));
        }
        Ok(CompressionEvent::Failed {
            job_id,
            summary,
            failure,
        }) => {
            let payload = RpcErrorPayload {
                summary,
                detail: failure.details,
            };
            emit_job_error(writer, job_id, &payload);
            write_failure(writer, request.id, payload);
        }
        Ok(CompressionEvent::Cancelled { job_id }) | Ok(CompressionEvent::Progress { job_id, .. }) => {
            let payload = parse_error_payload(&AppError::Aborted);
            emit_job_error(writer, job_id, &payload);
            write_failure(writer, request.id, payload);
        }
        Err(err) => write_failure(writer, request.id, parse_error_payload(&err)),
    }
}

/// Drop handles of compress workers that have already returned.
fn prune_finished(workers: &mut Vec<thread::JoinHandle<()>>) {
    workers.retain(|worker| !worker.is_finished());
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let settings = SidecarSettings::from_env();
    log::info!(
        target: "squish_vid::sidecar",
        "Starting sidecar: prefs={}, output={}",
        settings.prefs_path.display(),
        settings.output_dir.display()
    );
    let ctx = Arc::new(SidecarContext::from_settings(&settings));

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut async_workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                write_failure(
                    &stdout,
                    0,
                    RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_failure(
                    &stdout,
                    0,
                    RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                );
                continue;
            }
        };

        if is_async_request(&request.method) {
            prune_finished(&mut async_workers);
            let writer = Arc::clone(&stdout);
            let ctx = Arc::clone(&ctx);
            let worker = thread::spawn(move || {
                handle_async_compress(request, &writer, &ctx);
            });
            async_workers.push(worker);
        } else {
            handle_sync_request(request, &stdout, &ctx);
        }
    }

    ctx.compressor().cancel();
    for worker in async_workers {
        let _ = worker.join();
    }
    Ok(())
}
