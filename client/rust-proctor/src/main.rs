#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use placement_proctor::metrics;
use placement_proctor::models::timer::TimerEvent;
use placement_proctor::models::violation::IntegritySignal;
use placement_proctor::models::{OptionLetter, SubmitTrigger};
use placement_proctor::services::attempt_service::{
    AttemptSession, NavTarget, NavigationOutcome, SignalEffect,
};
use placement_proctor::services::environment::HeadlessEnvironment;
use placement_proctor::services::readiness_service::EntryGate;
use placement_proctor::utils::format::{format_clock, format_mbps};
use placement_proctor::{Config, ProctorContext};

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

enum Flow {
    Continue,
    Done,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placement_proctor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting placement proctor client");

    // Load configuration
    let config = Config::load().expect("Failed to load configuration");
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let test_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => {
            eprintln!("Usage: placement-proctor <test-id>");
            std::process::exit(2);
        }
    };

    let context = ProctorContext::new(config, Arc::new(HeadlessEnvironment));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !run_entry_gate(&context, &mut lines).await {
        tracing::info!("Left before starting the attempt");
        return;
    }

    let mut session = context.session(&test_id);
    if let Err(e) = session.start().await {
        eprintln!("Could not start the attempt: {:#}", e);
        std::process::exit(1);
    }
    print_question(&session);

    run_attempt(&mut session, &mut lines).await;

    match session.result() {
        Some(result) => {
            println!(
                "Result: {:.1}% ({})",
                result.percentage,
                if result.pass_status { "pass" } else { "fail" }
            );
        }
        None => println!("The attempt ended without a recorded result."),
    }

    if let Ok(snapshot) = metrics::render_metrics() {
        tracing::debug!("Metrics snapshot:\n{}", snapshot);
    }
}

/// Instructions screen: one readiness check up front, re-checks on
/// demand, and the start action held closed until the reading delay has
/// passed with a passing check.
async fn run_entry_gate(context: &ProctorContext, lines: &mut StdinLines) -> bool {
    let config = &context.config;
    println!("=== Placement Test ===");
    println!("Stay in fullscreen and keep this window focused for the whole test.");
    println!(
        "Leaving the window counts as a violation; {} warnings submit the test automatically.",
        config.max_warnings
    );

    let gate = EntryGate::new(Duration::from_secs(config.reading_delay_secs));
    let readiness = context.readiness();
    let mut report = readiness.check_readiness().await;
    println!("Connection speed: {}", format_mbps(report.speed_mbps));

    loop {
        if report.status.is_ok() {
            let remaining = gate.delay_remaining();
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
            println!("Type 'start' to begin, 'retry' to re-check, or 'quit' to leave.");
        } else {
            println!("Connection check failed. Type 'retry' to check again or 'quit' to leave.");
        }

        let Ok(Some(line)) = lines.next_line().await else {
            return false;
        };
        match line.trim() {
            "start" if gate.can_start(Some(&report)) => return true,
            "start" => {
                let why = if report.status.is_ok() {
                    "the reading delay is still running"
                } else {
                    "the connection check has not passed"
                };
                println!("Start is locked: {}.", why);
            }
            "retry" => {
                report = readiness.check_readiness().await;
                println!("Connection speed: {}", format_mbps(report.speed_mbps));
            }
            "quit" => return false,
            _ => println!("Commands: start, retry, quit"),
        }
    }
}

async fn run_attempt(session: &mut AttemptSession, lines: &mut StdinLines) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    // The first tick resolves immediately; consume it so the countdown
    // starts a full second after the attempt begins
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match session.tick().await {
                    Ok(Some(TimerEvent::TimerTick(tick))) => {
                        if tick.remaining_seconds % 30 == 0 || tick.remaining_seconds <= 10 {
                            println!("[{}]", format_clock(tick.remaining_seconds));
                        }
                    }
                    Ok(Some(TimerEvent::TimeExpired(_))) => {
                        println!("Time is up; the attempt was submitted.");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        eprintln!("! {:#}", e);
                        println!("Type 'submit' to retry.");
                    }
                }
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    // Input gone: same as the page being torn down
                    deliver_signal(session, IntegritySignal::PageUnload).await;
                    return;
                };
                if matches!(handle_command(session, line.trim()).await, Flow::Done) {
                    return;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted; submitting current progress.");
                deliver_signal(session, IntegritySignal::PageUnload).await;
                return;
            }
        }

        if session.phase().is_terminal() {
            return;
        }
    }
}

async fn handle_command(session: &mut AttemptSession, command: &str) -> Flow {
    // A pending warning blocks every control except its acknowledgment
    if session.pending_warning().is_some() {
        if command.is_empty() || command == "ok" {
            session.acknowledge_warning().await;
            print_question(session);
        } else {
            println!("[WARNING] Press Enter to acknowledge before continuing.");
        }
        return Flow::Continue;
    }

    match command {
        "" => {}
        "next" => navigate(session, NavTarget::Next).await,
        "prev" => navigate(session, NavTarget::Prev).await,
        "palette" => print_palette(session),
        "submit" => match session.submit(SubmitTrigger::Manual).await {
            Ok(Some(_)) => return Flow::Done,
            Ok(None) => println!("Nothing to submit."),
            Err(e) => {
                eprintln!("Submission failed: {:#}", e);
                println!("Type 'submit' to retry.");
            }
        },
        "blur" => deliver_signal(session, IntegritySignal::WindowBlur).await,
        "hide" => deliver_signal(session, IntegritySignal::DocumentHidden).await,
        "fsexit" => deliver_signal(session, IntegritySignal::FullscreenExit).await,
        "rightclick" => deliver_signal(session, IntegritySignal::ContextMenu).await,
        "quit" => {
            deliver_signal(session, IntegritySignal::PageUnload).await;
            return Flow::Done;
        }
        other => {
            if let Ok(letter) = other.parse::<OptionLetter>() {
                mark_option(session, letter);
            } else if let Some(rest) = other.strip_prefix("goto ") {
                match rest.trim().parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
                    Some(index) => navigate(session, NavTarget::Index(index)).await,
                    None => println!("Usage: goto <question number>"),
                }
            } else if let Some(combo) = other.strip_prefix("key ") {
                deliver_signal(session, IntegritySignal::KeyCombo(combo.trim().to_string())).await;
            } else {
                println!(
                    "Commands: a|b|c|d, next, prev, goto N, palette, submit, \
                     blur, hide, fsexit, rightclick, key <combo>, quit"
                );
            }
        }
    }
    Flow::Continue
}

fn mark_option(session: &mut AttemptSession, letter: OptionLetter) {
    let Some(question_id) = session
        .attempt()
        .and_then(|a| a.current_question())
        .map(|q| q.question_id.clone())
    else {
        println!("No question to answer.");
        return;
    };
    if session.select_option(&question_id, letter) {
        println!("Marked {}.", letter);
    }
}

async fn navigate(session: &mut AttemptSession, target: NavTarget) {
    match session.navigate(target).await {
        Ok(NavigationOutcome::Moved(_)) => print_question(session),
        Ok(NavigationOutcome::Ignored) => println!("No question there."),
        Ok(NavigationOutcome::WindowClosed) => {
            println!("The test is no longer live; your attempt was submitted.");
        }
        Err(e) => eprintln!("! {:#}", e),
    }
}

async fn deliver_signal(session: &mut AttemptSession, signal: IntegritySignal) {
    match session.handle_signal(signal).await {
        Ok(SignalEffect::Warned { kind, count, max }) => {
            println!(
                "[WARNING {}/{}] {} detected. Press Enter to acknowledge.",
                count,
                max,
                kind.as_str()
            );
        }
        Ok(SignalEffect::ForcedSubmission(reason)) => {
            println!("Attempt submitted automatically ({}).", reason.label());
        }
        Ok(_) => {}
        Err(e) => eprintln!("! {:#}", e),
    }
}

fn print_question(session: &AttemptSession) {
    let Some(attempt) = session.attempt() else {
        return;
    };
    let Some(question) = attempt.current_question() else {
        return;
    };
    println!(
        "--- Question {} of {}  [{}] ---",
        attempt.current_index + 1,
        attempt.questions.len(),
        format_clock(attempt.remaining_seconds)
    );
    println!("{}", question.question);
    println!("  (a) {}", question.option_a);
    println!("  (b) {}", question.option_b);
    println!("  (c) {}", question.option_c);
    println!("  (d) {}", question.option_d);
    if let Some(choice) = attempt.answers.get(&question.question_id) {
        println!("  marked: {}", choice);
    }
}

fn print_palette(session: &AttemptSession) {
    let Some(attempt) = session.attempt() else {
        return;
    };
    let marks: Vec<String> = attempt
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| match attempt.answers.get(&q.question_id) {
            Some(letter) => format!("{}:{}", i + 1, letter),
            None => format!("{}:-", i + 1),
        })
        .collect();
    println!(
        "Palette: {}  ({} of {} answered)",
        marks.join(" "),
        attempt.answered_count(),
        attempt.questions.len()
    );
}
