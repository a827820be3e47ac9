use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::solvers::{RunEvent, SolverEvent};

/// Turns one solver event into a log record.
pub fn log_event(msg: &SolverEvent) {
    let run = &msg.run;
    match &msg.event {
        RunEvent::Started {
            temperature,
            max_steps,
            initial_energy,
        } => log::info!(
            "[{}] Starting BHMC run at T={}K, {} steps, E0={:.6} eV",
            run,
            temperature,
            max_steps,
            initial_energy
        ),
        RunEvent::StepCompleted(stats) => log::debug!(
            "[{}] step {}: trial {:.6} eV ({}), current {:.6} eV, best {:.6} eV, accepted {}",
            run,
            stats.step,
            stats.trial_energy,
            if stats.accepted { "accepted" } else { "rejected" },
            stats.current_energy,
            stats.best_energy,
            stats.accepted_count
        ),
        RunEvent::NewBest { step, energy } => {
            log::info!("[{}] New best at step {}: {:.6} eV", run, step, energy)
        }
        RunEvent::Finished {
            steps,
            accepted,
            best_energy,
        } => {
            let rate = if *steps > 0 {
                format!("{:.2}", *accepted as f64 / *steps as f64)
            } else {
                "n/a".to_string()
            };
            log::info!(
                "[{}] BHMC completed. Acceptance rate: {} ({}/{}), best {:.6} eV",
                run,
                rate,
                accepted,
                steps,
                best_energy
            );
        }
    }
}

/// Logs events until every sender is dropped.
pub fn spawn_event_logger(rx: Receiver<SolverEvent>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("Event-Logger".to_string())
        .spawn(move || {
            for msg in rx {
                log_event(&msg);
            }
        })
}
