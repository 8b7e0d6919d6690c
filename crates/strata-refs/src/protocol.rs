//! The compare-and-swap retry loop shared by commits and merges.

use std::time::Instant;

use strata_model::{GlobalState, ReferenceRecord};
use strata_store::{CasOutcome, ReferenceUpdate, StoreError, StoreResult};
use strata_types::Hash;

use crate::store::ReferenceStore;

/// What one attempt wants done with the reference.
pub(crate) enum Step<P, T> {
    /// Swap the reference to `target`, which is already persisted. `payload`
    /// is handed back once the swap succeeds.
    Swap { target: Hash, payload: P },
    /// Stop without touching the reference.
    Finish(T),
}

pub(crate) enum Outcome<P, T> {
    Committed {
        reference: ReferenceRecord,
        payload: P,
        attempts: u32,
    },
    Finished(T),
}

/// Where an attempt is in the protocol.
enum State<P> {
    Building {
        current: ReferenceRecord,
    },
    Persisted {
        current: ReferenceRecord,
        target: Hash,
        payload: P,
    },
    CasPending {
        current: ReferenceRecord,
        update: ReferenceUpdate,
        payload: P,
    },
    ConflictRetry,
}

impl ReferenceStore {
    /// Run the commit protocol against reference `name`.
    ///
    /// `build` is called once per attempt with the reference as just read;
    /// it resolves conflicts, persists what it needs and names the new
    /// target. A rejected swap backs off, re-reads and calls `build` again,
    /// up to `max_retries` attempts in total.
    pub(crate) fn drive<P, T>(
        &self,
        name: &str,
        global_state: &[GlobalState],
        mut build: impl FnMut(&ReferenceRecord) -> StoreResult<Step<P, T>>,
    ) -> StoreResult<Outcome<P, T>> {
        let started = Instant::now();
        let timeout = self.config.call_timeout();
        let max_attempts = self.config.max_retries.max(1);
        let mut attempts = 0;
        let mut unresolved = 0;

        let mut state = State::Building {
            current: self.read_reference(name)?,
        };
        loop {
            state = match state {
                State::Building { current } => {
                    attempts += 1;
                    if started.elapsed() >= timeout {
                        return Err(StoreError::Timeout {
                            operation: format!("commit to {name}"),
                            after: timeout,
                        });
                    }
                    match build(&current)? {
                        Step::Finish(value) => return Ok(Outcome::Finished(value)),
                        Step::Swap { target, payload } => State::Persisted {
                            current,
                            target,
                            payload,
                        },
                    }
                }

                State::Persisted {
                    current,
                    target,
                    payload,
                } => {
                    let update = ReferenceUpdate::advance(&current, target)
                        .with_global_state(global_state.iter().cloned());
                    State::CasPending {
                        current,
                        update,
                        payload,
                    }
                }

                State::CasPending {
                    current,
                    update,
                    payload,
                } => match self.adapter.cas_reference(&update) {
                    Ok(CasOutcome::Success) => {
                        let reference = update.applied_to(&current);
                        tracing::info!(
                            reference = %name,
                            hash = %reference.hash.short_hex(),
                            generation = %reference.generation,
                            attempt = attempts,
                            "reference updated"
                        );
                        return Ok(Outcome::Committed {
                            reference,
                            payload,
                            attempts,
                        });
                    }
                    Ok(CasOutcome::ConflictRejected { current: newer }) => {
                        tracing::debug!(
                            reference = %name,
                            attempt = attempts,
                            expected = %update.expected,
                            actual = %newer.generation,
                            "reference moved concurrently"
                        );
                        State::ConflictRetry
                    }
                    Err(e) if e.is_retryable() => {
                        // The swap may or may not have been applied.
                        unresolved += 1;
                        tracing::warn!(reference = %name, attempt = attempts, error = %e, "reference update outcome unknown");
                        let observed = self.read_reference(name)?;
                        if observed == update.applied_to(&current) {
                            tracing::info!(reference = %name, hash = %observed.hash.short_hex(), "reference update had been applied");
                            return Ok(Outcome::Committed {
                                reference: observed,
                                payload,
                                attempts,
                            });
                        } else if observed.generation == update.expected {
                            if unresolved >= self.retry.max_attempts {
                                return Err(e);
                            }
                            std::thread::sleep(self.retry.backoff(unresolved));
                            State::CasPending {
                                current: observed,
                                update,
                                payload,
                            }
                        } else {
                            State::ConflictRetry
                        }
                    }
                    Err(e) => return Err(e),
                },

                State::ConflictRetry => {
                    if attempts >= max_attempts {
                        tracing::warn!(reference = %name, attempts, "giving up after repeated conflicts");
                        return Err(StoreError::ConflictExhausted {
                            reference: name.to_string(),
                            attempts,
                        });
                    }
                    std::thread::sleep(self.retry.backoff(attempts));
                    State::Building {
                        current: self.read_reference(name)?,
                    }
                }
            };
        }
    }
}
