//! Best-effort FPP overlay activation side-channel (spec §4.2, §6).
//!
//! `PUT .../state {"State":3}` then `GET .../state` to verify, retried up
//! to 3 times with a 1-second backoff. Never fatal: the shared-memory
//! buffer is already wired up regardless of whether FPP has been told to
//! read from it (spec §7 "External service" row).

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const ALWAYS_ON_STATE: i64 = 3;

/// Activate the named overlay model's "always transmit" state. Returns
/// whether the readback confirmed it; failure is logged by the caller and
/// never propagated as an error.
pub fn activate(model: &str) -> bool {
    let set_url = format!("http://localhost/api/overlays/model/{model}/state");
    let get_url = format!("http://localhost/api/overlays/model/{model}");

    for attempt in 1..=MAX_ATTEMPTS {
        if let Err(err) = put_state(&set_url) {
            tracing::warn!(attempt, max = MAX_ATTEMPTS, error = %err, "overlay_activate_put_failed");
            if attempt < MAX_ATTEMPTS {
                std::thread::sleep(RETRY_BACKOFF);
            }
            continue;
        }

        match get_state(&get_url) {
            Ok(state) if state == ALWAYS_ON_STATE => {
                tracing::info!(model, state, "overlay_activate_confirmed");
                return true;
            }
            Ok(state) => {
                tracing::warn!(attempt, max = MAX_ATTEMPTS, state, expected = ALWAYS_ON_STATE, "overlay_activate_readback_mismatch");
            }
            Err(err) => {
                tracing::warn!(attempt, max = MAX_ATTEMPTS, error = %err, "overlay_activate_readback_failed");
            }
        }

        if attempt < MAX_ATTEMPTS {
            std::thread::sleep(RETRY_BACKOFF);
        }
    }

    tracing::warn!(model, "overlay_activate_unconfirmed_after_retries");
    false
}

fn put_state(url: &str) -> Result<(), String> {
    ureq::put(url)
        .timeout(REQUEST_TIMEOUT)
        .send_json(serde_json::json!({ "State": ALWAYS_ON_STATE }))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn get_state(url: &str) -> Result<i64, String> {
    let response = ureq::get(url)
        .timeout(REQUEST_TIMEOUT)
        .call()
        .map_err(|e| e.to_string())?;
    let body: serde_json::Value = response.into_json().map_err(|e| e.to_string())?;
    body.get("State")
        .or_else(|| body.get("state"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| "response missing State field".to_string())
}
