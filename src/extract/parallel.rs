//! Portfolio extraction: a small pool of worker threads, each running a
//! distinct extraction strategy. The coordinator owns a single one-way stop
//! flag; the first worker to produce a valid circuit wins, with a bounded
//! grace period in which a smaller circuit may supersede it. Ties break by
//! worker index.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::aig::Aig;
use crate::cancel::CancelToken;
use crate::cnf::{negate_via_learning, Cnf};
use crate::encode::Problem;

use super::{extract_circuit, ExtractionConfig, Incrementality};

/// The strategies run by the portfolio, in worker-index order.
fn portfolio(workers: usize) -> Vec<ExtractionConfig> {
    let variants = [
        ExtractionConfig {
            dependency_mode: false,
            incremental: Incrementality::None,
            second_pass: false,
            min_cores: false,
        },
        ExtractionConfig {
            dependency_mode: true,
            incremental: Incrementality::None,
            second_pass: false,
            min_cores: false,
        },
        ExtractionConfig {
            dependency_mode: false,
            incremental: Incrementality::None,
            second_pass: true,
            min_cores: true,
        },
        ExtractionConfig {
            dependency_mode: false,
            incremental: Incrementality::Signals,
            second_pass: false,
            min_cores: false,
        },
        ExtractionConfig {
            dependency_mode: true,
            incremental: Incrementality::Full,
            second_pass: false,
            min_cores: true,
        },
    ];
    variants.iter().copied().cycle().take(workers).collect()
}

/// Runs the extraction portfolio with the given number of workers and
/// returns the smallest completed controller circuit.
pub fn extract_parallel(
    spec: &Aig,
    problem: &mut Problem,
    win: &Cnf,
    workers: usize,
) -> Option<Aig> {
    let Problem { vars, enc } = problem;
    info!("Extracting a controller circuit with {} workers", workers);
    let neg_win = negate_via_learning(win, vars);
    // memoize the dependency closure before it is shared read-only
    enc.tmp_deps_trans(vars);

    let shared = Arc::new((
        spec.clone(),
        enc.clone(),
        vars.clone(),
        win.clone(),
        neg_win,
    ));
    let token = CancelToken::new();
    let (sender, receiver) = mpsc::channel();

    let configs = portfolio(workers);
    let total = configs.len();
    let mut handles = Vec::with_capacity(total);
    for (index, config) in configs.into_iter().enumerate() {
        let shared = Arc::clone(&shared);
        let token = token.clone();
        let sender = sender.clone();
        let handle = thread::Builder::new()
            .name(format!("extractor-{}", index))
            .spawn(move || {
                let (spec, enc, vars, win, neg_win) = &*shared;
                let mut vars = vars.clone();
                let result = extract_circuit(
                    spec,
                    &mut vars,
                    enc,
                    enc.tmp_deps_trans_ref(),
                    win,
                    neg_win,
                    config,
                    &token,
                );
                // the coordinator may already be gone after the grace period
                let _ = sender.send((index, result));
            })
            .expect("failed to spawn extraction worker");
        handles.push(handle);
    }
    drop(sender);

    let started = Instant::now();
    let mut best: Option<(usize, usize, Aig)> = None;
    let mut deadline: Option<Instant> = None;
    let mut received = 0;
    while received < total {
        let message = match deadline {
            None => receiver.recv().ok(),
            Some(until) => {
                let now = Instant::now();
                if now >= until {
                    break;
                }
                match receiver.recv_timeout(until - now) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        };
        let (index, result) = match message {
            Some(message) => message,
            None => break,
        };
        received += 1;
        if let Some(circuit) = result {
            debug!(
                "Worker {} finished with {} gates",
                index,
                circuit.num_ands()
            );
            let size = circuit.num_ands();
            let better = match &best {
                None => true,
                Some((best_size, best_index, _)) => {
                    size < *best_size || (size == *best_size && index < *best_index)
                }
            };
            if better {
                best = Some((size, index, circuit));
            }
            if deadline.is_none() {
                // first valid circuit: stop the others, but give nearly
                // finished workers a bounded chance to produce a smaller one
                token.cancel();
                let elapsed = started.elapsed();
                deadline = Some(Instant::now() + elapsed / 2 + Duration::from_millis(100));
            }
        }
    }
    token.cancel();
    for handle in handles {
        let _ = handle.join();
    }
    best.map(|(_, index, circuit)| {
        debug!("Selected the circuit of worker {}", index);
        circuit
    })
}
