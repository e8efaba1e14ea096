use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One HTTP-callable unit of work in a sequence.
///
/// The step's `payload` is opaque to the sequencer and forwarded verbatim to
/// `url` as a JSON body. `delay` is the number of seconds to wait before this
/// step is invoked, counted from when the previous step's execution was
/// scheduled to complete; `0` means "next tick, no artificial delay".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Absolute URL that receives the step's payload via POST.
    pub url: String,
    /// Arbitrary JSON object forwarded verbatim to `url`.
    pub payload: Value,
    /// Seconds to wait before this step runs.
    #[serde(rename = "delay")]
    pub delay_seconds: u64,
}
