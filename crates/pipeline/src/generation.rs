use chrono::Utc;
use evidex_core::error::ProviderError;
use evidex_core::{EventBus, Generator, RunEvent};
use std::time::Instant;
use tracing::{info, warn};

/// Run one generation, logging it and publishing the outcome.
///
/// Returns the output and the time spent waiting for it.
pub(crate) async fn generate(
    generator: &dyn Generator,
    prompt: &str,
    temperature: f32,
    events: Option<&EventBus>,
) -> Result<(String, u64), ProviderError> {
    let started = Instant::now();
    let prompt_chars = prompt.chars().count();
    info!(model = generator.model(), prompt_chars, "Calling generator");

    match generator.generate(prompt, temperature).await {
        Ok(output) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            let output_chars = output.chars().count();
            info!(
                model = generator.model(),
                output_chars, duration_ms, "Generation completed"
            );
            if let Some(events) = events {
                events.publish(RunEvent::GenerationCompleted {
                    model: generator.model().to_string(),
                    prompt_chars,
                    output_chars,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Ok((output, duration_ms))
        }
        Err(e) => {
            warn!(model = generator.model(), error = %e, "Generation failed");
            if let Some(events) = events {
                events.publish(RunEvent::ErrorOccurred {
                    context: format!("generate ({})", generator.model()),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(e)
        }
    }
}
