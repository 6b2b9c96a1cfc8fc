use rootcause_core::{OracleError, ReasoningOracle, StageContext};
use tracing::warn;

/// Asks the oracle until `validate` accepts its answer.
///
/// Schema failures are re-prompted with the error as feedback, at most
/// `retries` times. Backend failures are returned immediately.
pub(crate) async fn consult<T, F>(
    oracle: &dyn ReasoningOracle,
    context: StageContext,
    retries: u32,
    mut validate: F,
) -> Result<T, OracleError>
where
    F: FnMut(serde_json::Value) -> Result<T, OracleError>,
{
    let mut context = context;
    loop {
        let error = match oracle.decide(&context).await {
            Ok(raw) => match validate(raw) {
                Ok(accepted) => return Ok(accepted),
                Err(e) => e,
            },
            Err(OracleError::Backend(reason)) => return Err(OracleError::Backend(reason)),
            Err(e) => e,
        };

        if context.attempt > retries {
            return Err(error);
        }
        warn!(
            stage = context.stage.as_str(),
            attempt = context.attempt,
            "Rejected oracle answer: {}",
            error
        );
        context = context.retry(error.to_string());
    }
}
