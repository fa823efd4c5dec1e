//! Command-line front end: submits jobs and drains their results.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use bearing_diag::cache::{DiagnosticView, DiagnosticsCache};
use bearing_diag::config::{self, AppSettings};
use bearing_diag::family::{FitParams, ModelFamily};
use bearing_diag::jobs::{JobKind, JobListener, JobMessage, JobScheduler, JobStatus};
use bearing_diag::logging;
use bearing_diag::pipeline::{
    self, DiagnosisResult, PipelineContext, TrainingProgress, TrainingResult,
};
use bearing_diag::signal::SignalLoader;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init(options.verbose) {
        eprintln!("Logging disabled: {err}");
    }
    let settings = match config::load_or_default() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Using default settings: {err}");
            AppSettings::default()
        }
    };
    let mut session = Session::new(settings, options.overrides)?;
    match options.command {
        Command::Shell => session.shell(),
        command => {
            session.execute(command)?;
            session.wait_idle();
            if session.reporter.failures > 0 {
                Err(format!("{} job(s) failed", session.reporter.failures))
            } else {
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Train {
        family: ModelFamily,
        data: PathBuf,
    },
    Diagnose {
        model: PathBuf,
        /// `None` replays the configured real-time recording.
        signal: Option<PathBuf>,
    },
    Preview {
        recording: PathBuf,
    },
    Show {
        family: ModelFamily,
        view: DiagnosticView,
    },
    Status,
    Families,
    ClearCache,
    Shell,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Overrides {
    epochs: Option<usize>,
    samples_per_class: Option<usize>,
    seed: Option<u64>,
    augment: bool,
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    command: Command,
    verbose: bool,
    overrides: Overrides,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut verbose = false;
    let mut overrides = Overrides::default();
    let mut positional = Vec::new();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "-v" | "--verbose" => verbose = true,
            "--augment" => overrides.augment = true,
            "--epochs" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--epochs requires a value".to_string())?;
                overrides.epochs = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --epochs value: {value}"))?,
                );
            }
            "--samples" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--samples requires a value".to_string())?;
                overrides.samples_per_class = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --samples value: {value}"))?,
                );
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                overrides.seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                overrides.out_dir = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") && flag != "--realtime" => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            value => positional.push(value.to_string()),
        }
        idx += 1;
    }
    if positional.is_empty() {
        return Err(help_text());
    }
    Ok(CliOptions {
        command: parse_command(&positional)?,
        verbose,
        overrides,
    })
}

/// Parse one command from its words; shared by the CLI and the shell.
fn parse_command(words: &[String]) -> Result<Command, String> {
    let arg = |idx: usize, what: &str| {
        words
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("{} requires {what}", words[0]))
    };
    let family = |token: String| {
        ModelFamily::parse(&token).ok_or_else(|| format!("Unknown model family: {token}"))
    };
    match words.first().map(String::as_str) {
        Some("train") => Ok(Command::Train {
            family: family(arg(1, "a model family")?)?,
            data: PathBuf::from(arg(2, "a data folder or file")?),
        }),
        Some("diagnose") => {
            let model = PathBuf::from(arg(1, "a model file")?);
            let signal = match arg(2, "a signal file or --realtime")?.as_str() {
                "--realtime" => None,
                path => Some(PathBuf::from(path)),
            };
            Ok(Command::Diagnose { model, signal })
        }
        Some("preview") => Ok(Command::Preview {
            recording: PathBuf::from(arg(1, "a recording")?),
        }),
        Some("show") => {
            let family = family(arg(1, "a model family")?)?;
            let token = arg(2, "a view")?;
            let view = DiagnosticView::parse(&token)
                .ok_or_else(|| format!("Unknown diagnostic view: {token}"))?;
            Ok(Command::Show { family, view })
        }
        Some("status") => Ok(Command::Status),
        Some("families") => Ok(Command::Families),
        Some("clear-cache") => Ok(Command::ClearCache),
        Some("shell") => Ok(Command::Shell),
        Some(other) => Err(format!("Unknown command: {other}\n\n{}", help_text())),
        None => Err(help_text()),
    }
}

fn help_text() -> String {
    [
        "bearing-diag",
        "",
        "Trains bearing fault classifiers on .mat vibration recordings and diagnoses new ones.",
        "",
        "Usage:",
        "  bearing-diag train <rf|cnn|lstm|gru> <data folder or file> [--out <dir>]",
        "  bearing-diag diagnose <model file> <signal.mat | --realtime>",
        "  bearing-diag preview <signal.mat>",
        "  bearing-diag show <family> <confusion|roc|pr|loss|acc>",
        "  bearing-diag families",
        "  bearing-diag clear-cache",
        "  bearing-diag shell",
        "",
        "Options:",
        "  --out <dir>       Directory for the trained model file (default: current directory)",
        "  --epochs <n>      Override the family's epoch count (neural families)",
        "  --samples <n>     Override windows per class",
        "  --seed <n>        Override the configured seed",
        "  --augment         Draw augmented windows instead of evenly spaced ones",
        "  -v, --verbose     Debug-level logging",
        "",
        "The shell reads the same commands from stdin, one per line, while jobs run in",
        "the background; `status` reports running jobs and `quit` leaves the shell.",
    ]
    .join("\n")
}

/// Prints completed jobs and saves trained models.
struct Reporter {
    out_dir: PathBuf,
    failures: usize,
}

impl JobListener for Reporter {
    fn on_training_complete(&mut self, message: JobMessage<TrainingResult>) {
        match message {
            JobMessage::Success(result) => {
                println!(
                    "{} test accuracy: {:.4}",
                    result.family(),
                    result.score
                );
                println!("{}", result.classification().render());
                if let Some(last) = result.history.as_ref().and_then(|history| history.last()) {
                    println!(
                        "final epoch {}: loss {:.4} / val_loss {:.4}, acc {:.3} / val_acc {:.3}",
                        last.epoch,
                        last.train_loss,
                        last.valid_loss,
                        last.train_accuracy,
                        last.valid_accuracy
                    );
                }
                for path in &result.diagnostics {
                    println!("diagnostic: {}", path.display());
                }
                match result.artifact.save_in_dir(&self.out_dir) {
                    Ok(path) => println!("model saved to {}", path.display()),
                    Err(err) => {
                        self.failures += 1;
                        eprintln!("Failed to save model: {err}");
                    }
                }
            }
            JobMessage::Failure { kind, message } => {
                self.failures += 1;
                eprintln!("Training failed ({kind:?}): {message}");
            }
        }
    }

    fn on_diagnosis_complete(&mut self, message: JobMessage<DiagnosisResult>) {
        match message {
            JobMessage::Success(result) => {
                println!(
                    "{}: {} ({} of {} windows)",
                    result.signal.display(),
                    result.majority,
                    result.counts.get(&result.majority).copied().unwrap_or(0),
                    result.labels.len()
                );
                for (label, count) in &result.counts {
                    println!("  {label:<16} {count}");
                }
            }
            JobMessage::Failure { kind, message } => {
                self.failures += 1;
                eprintln!("Diagnosis failed ({kind:?}): {message}");
            }
        }
    }
}

struct Session {
    settings: AppSettings,
    overrides: Overrides,
    scheduler: JobScheduler,
    reporter: Reporter,
    last_progress: Option<TrainingProgress>,
}

impl Session {
    fn new(settings: AppSettings, overrides: Overrides) -> Result<Self, String> {
        let cache_dir = settings
            .resolved_cache_dir()
            .map_err(|err| err.to_string())?;
        let ctx = PipelineContext::new(
            SignalLoader::new(&settings.drive_end_marker).map_err(|err| err.to_string())?,
            DiagnosticsCache::new(cache_dir),
            settings.preview_points,
        );
        let seed = overrides.seed.unwrap_or(settings.seed);
        let out_dir = overrides
            .out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            scheduler: JobScheduler::new(ctx, seed),
            reporter: Reporter {
                out_dir,
                failures: 0,
            },
            settings,
            overrides,
            last_progress: None,
        })
    }

    fn cache(&self) -> &DiagnosticsCache {
        &self.scheduler.context().cache
    }

    /// Submit a job or run a quick command inline.
    fn execute(&mut self, command: Command) -> Result<(), String> {
        match command {
            Command::Train { family, data } => {
                let mut params = family.hyperparams();
                params.seed = self.overrides.seed.unwrap_or(self.settings.seed);
                params.augment |= self.overrides.augment;
                if let Some(samples) = self.overrides.samples_per_class {
                    params.samples_per_class = samples;
                }
                if let (Some(epochs), FitParams::Network(options)) =
                    (self.overrides.epochs, &mut params.fit)
                {
                    options.epochs = epochs;
                }
                let id = self
                    .scheduler
                    .submit_training_with(family, &data, params)
                    .map_err(|err| err.to_string())?;
                println!("training {family} (job {id})");
            }
            Command::Diagnose { model, signal } => {
                let signal = match signal.or_else(|| self.settings.realtime_signal.clone()) {
                    Some(signal) => signal,
                    None => return Err("No realtime_signal configured".to_string()),
                };
                let id = self
                    .scheduler
                    .submit_diagnosis(&model, &signal)
                    .map_err(|err| err.to_string())?;
                println!("diagnosing {} (job {id})", signal.display());
            }
            Command::Preview { recording } => {
                let path = pipeline::render_preview(self.scheduler.context(), &recording)
                    .map_err(|err| err.to_string())?;
                println!("preview: {}", path.display());
            }
            Command::Show { family, view } => {
                let path = self
                    .cache()
                    .lookup(family, view)
                    .map_err(|err| err.to_string())?;
                println!("{}", path.display());
            }
            Command::Status => {
                for kind in [JobKind::Training, JobKind::Diagnosis] {
                    match self.scheduler.status(kind) {
                        JobStatus::Idle => println!("{kind}: idle"),
                        JobStatus::Running {
                            id,
                            elapsed,
                            progress,
                        } => {
                            let stage = progress
                                .map(|p| format!(", {} (epoch {})", p.stage, p.epochs_done))
                                .unwrap_or_default();
                            println!("{kind}: job {id} running {:.0}s{stage}", elapsed.as_secs_f32());
                        }
                    }
                }
            }
            Command::Families => {
                for family in ModelFamily::ALL {
                    let params = family.hyperparams();
                    let epochs = match &params.fit {
                        FitParams::Network(options) => {
                            format!("batch {} epochs {}", options.batch_size, options.epochs)
                        }
                        FitParams::Forest(options) => format!("{} trees", options.n_trees),
                    };
                    println!(
                        "{:<14} window {:>4}  {} per class  normalize {:<5}  split {}/{}/{}  {}",
                        family.model_name(),
                        params.window_length,
                        params.samples_per_class,
                        params.normalize,
                        params.split.train,
                        params.split.valid,
                        params.split.test,
                        epochs
                    );
                }
            }
            Command::ClearCache => {
                let removed = self.cache().clear().map_err(|err| err.to_string())?;
                println!("removed {removed} cached images");
            }
            Command::Shell => return Err("Already in the shell".to_string()),
        }
        Ok(())
    }

    /// One event-loop step: report stage changes and deliver finished jobs.
    fn pump(&mut self) {
        if let JobStatus::Running {
            progress: Some(progress),
            ..
        } = self.scheduler.status(JobKind::Training)
        {
            if self.last_progress != Some(progress) {
                self.last_progress = Some(progress);
                if progress.epochs_done > 0 {
                    println!("training: {} (epoch {})", progress.stage, progress.epochs_done);
                } else {
                    println!("training: {}", progress.stage);
                }
            }
        }
        self.scheduler.dispatch(&mut self.reporter);
    }

    fn wait_idle(&mut self) {
        loop {
            self.pump();
            if self.scheduler.is_idle() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Read commands from stdin while jobs run; clears the cache on exit if configured.
    fn shell(&mut self) -> Result<(), String> {
        let (tx, rx) = mpsc::channel::<String>();
        thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        println!("bearing-diag shell; type `help` for commands");
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let words: Vec<String> =
                        line.split_whitespace().map(str::to_string).collect();
                    match words.first().map(String::as_str) {
                        None => {}
                        Some("quit" | "exit") => break,
                        Some("help") => println!("{}", help_text()),
                        Some(_) => {
                            if let Err(err) = parse_command(&words).and_then(|c| self.execute(c)) {
                                eprintln!("{err}");
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.wait_idle();
                    break;
                }
            }
            self.pump();
        }
        if !self.scheduler.is_idle() {
            println!("leaving with jobs still running; their results are discarded");
        }
        if self.settings.clear_cache_on_exit {
            if let Err(err) = self.cache().clear() {
                eprintln!("Failed to clear cache: {err}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_training_with_overrides() {
        let options = parse_args(words("train cnn data/ --epochs 2 --samples 50 -v")).unwrap();
        assert_eq!(
            options.command,
            Command::Train {
                family: ModelFamily::Cnn1d,
                data: PathBuf::from("data/")
            }
        );
        assert!(options.verbose);
        assert_eq!(options.overrides.epochs, Some(2));
        assert_eq!(options.overrides.samples_per_class, Some(50));
    }

    #[test]
    fn realtime_diagnosis_has_no_signal() {
        assert_eq!(
            parse_command(&words("diagnose GRU.network --realtime")).unwrap(),
            Command::Diagnose {
                model: PathBuf::from("GRU.network"),
                signal: None
            }
        );
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert!(parse_command(&words("train svm data")).is_err());
        assert!(parse_command(&words("show rf spectrogram")).is_err());
        assert!(parse_args(words("families --bogus")).is_err());
        assert!(parse_command(&words("diagnose model.forest")).is_err());
    }
}
