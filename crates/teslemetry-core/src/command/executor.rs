// ── Command execution ──
//
// Runs a vendor call and folds the reply into a domain result. Vehicle
// commands additionally inspect the `{"response": {"result", "reason"}}`
// envelope, where a handful of refusals mean "nothing to do".

use std::future::Future;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;

/// Refusal reasons that leave the vehicle in the requested state anyway.
pub const ACCEPTABLE_REASONS: &[&str] = &["already_set", "not_charging", "requested"];

/// Await a vendor call, translating a vendor failure into
/// [`CoreError::CommandFailed`].
pub async fn execute<F>(call: F) -> Result<Value, CoreError>
where
    F: Future<Output = Result<Value, teslemetry_api::Error>>,
{
    let started = Instant::now();
    let result = call.await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(reply) => {
            debug!(elapsed_ms, reply = %reply, "command reply");
            Ok(reply)
        }
        Err(e) => {
            debug!(elapsed_ms, error = %e, "command failed");
            Err(CoreError::CommandFailed {
                message: e.message(),
            })
        }
    }
}

/// [`execute`] a vehicle command and interpret its envelope.
///
/// `Ok(true)` means applied, `Ok(false)` means a benign refusal.
pub async fn execute_vehicle_command<F>(call: F) -> Result<bool, CoreError>
where
    F: Future<Output = Result<Value, teslemetry_api::Error>>,
{
    let reply = execute(call).await?;
    interpret_vehicle_reply(&reply)
}

/// Classify a vehicle command envelope.
pub fn interpret_vehicle_reply(reply: &Value) -> Result<bool, CoreError> {
    let Some(response) = reply.get("response").filter(|r| !r.is_null()) else {
        return Err(match reply.get("error").filter(|e| !e.is_null()) {
            Some(error) => CoreError::CommandError {
                error: error
                    .as_str()
                    .map_or_else(|| error.to_string(), str::to_owned),
            },
            None => CoreError::CommandNoResponse,
        });
    };

    if response.get("result").and_then(Value::as_bool) == Some(true) {
        return Ok(true);
    }

    match response
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
    {
        Some(reason) if ACCEPTABLE_REASONS.contains(&reason) => {
            debug!(reason, "command already satisfied");
            Ok(false)
        }
        Some(reason) => Err(CoreError::CommandRejected {
            reason: reason.to_owned(),
        }),
        None => Err(CoreError::CommandNoReason),
    }
}
