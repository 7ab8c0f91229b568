//! IUT runner.
//!
//! [`run_script`] connects an implementation under test to a [`ScriptPlayer`]
//! over a fresh [`duplex`] channel. The IUT runs as its own tokio task and the
//! player runs on the calling task; they share nothing but the channel.

use std::{fmt::Debug, future::Future, time::Duration};

use tokio::time::Instant;

use crate::{
    duplex::{duplex, DuplexStream},
    player::{PlayerConfig, PlayerError, ScriptPlayer},
    transcript::Transcript,
};

/// How long a passing run waits for the IUT to finish when no timeout is
/// configured.
pub const IUT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Error for [`run_script`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// The transcript was not satisfied.
    #[error(transparent)]
    Player(#[from] PlayerError),
    /// The run did not finish in time.
    #[error("{name}: script did not complete within {timeout:?}")]
    Timeout {
        /// Name of the script.
        name: String,
        /// The configured timeout.
        timeout: Duration,
    },
    /// The IUT task panicked.
    #[error("{name}: implementation under test panicked")]
    IutPanicked {
        /// Name of the script.
        name: String,
    },
}

/// Runs `iut` against `transcript`.
///
/// The IUT is handed one end of a rendezvous channel and spawned on the tokio
/// runtime; the player replays the transcript on the other end. Once the
/// player is done its end is dropped and the IUT task is joined. Whatever the
/// IUT returns is logged and otherwise ignored, since it usually observes the
/// teardown as an error.
///
/// The join is bounded by what is left of the configured timeout, or by
/// [`IUT_GRACE_PERIOD`] without one. An IUT still running after that is
/// aborted.
///
/// # Errors
///
/// Returns the first player error, a timeout if one is configured, or an
/// error if the IUT panicked. On failure the IUT task is aborted.
#[tracing::instrument(skip_all, fields(name = %config.name()), err)]
pub async fn run_script<F, Fut, T>(
    config: &PlayerConfig,
    transcript: &Transcript,
    iut: F,
) -> Result<(), HarnessError>
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Debug + Send + 'static,
{
    let started = Instant::now();
    let (mut harness_io, iut_io) = duplex();
    let mut handle = tokio::spawn(iut(iut_io));

    let player = ScriptPlayer::new(config.clone());
    let result = match config.timeout() {
        Some(timeout) => {
            match tokio::time::timeout(timeout, player.run(transcript, &mut harness_io)).await {
                Ok(result) => result.map_err(HarnessError::from),
                Err(_) => Err(HarnessError::Timeout {
                    name: config.name().to_string(),
                    timeout,
                }),
            }
        }
        None => player
            .run(transcript, &mut harness_io)
            .await
            .map_err(HarnessError::from),
    };

    if let Err(err) = result {
        handle.abort();
        return Err(err);
    }

    drop(harness_io);

    let deadline = match config.timeout() {
        Some(timeout) => started + timeout,
        None => Instant::now() + IUT_GRACE_PERIOD,
    };
    let joined = match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::debug!("implementation under test did not finish, aborting");
            handle.abort();
            handle.await
        }
    };

    match joined {
        Ok(output) => {
            tracing::debug!(?output, "implementation under test finished");
            Ok(())
        }
        Err(err) if err.is_panic() => Err(HarnessError::IutPanicked {
            name: config.name().to_string(),
        }),
        Err(err) => {
            tracing::debug!(%err, "implementation under test was cancelled");
            Ok(())
        }
    }
}
