//! src/main.rs
//! ============================================================================
//! # trek: headless driver for the navigator
//!
//! Reads one command per line from stdin, applies background updates as they
//! arrive and prints the current directory and entry after each step.

use std::{
    panic::PanicHookInfo,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    signal::unix::{Signal, SignalKind, signal},
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{error, info, warn};

use trek_core::{
    Logger, Navigator,
    config::Config,
    controller::event_loop::{EventLoop, Notification},
    model::persistence::BufferMode,
    util::paths::home_dir,
};

/// Exit status after a termination signal.
const SIGNAL_EXIT_CODE: i32 = 3;

const DEFAULT_HEIGHT: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "trek")]
#[command(version, about = "Headless terminal file navigator")]
struct Cli {
    /// Directory to start in; defaults to the current directory.
    dir: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let cli: Cli = Cli::parse();
    setup_panic_handler();

    home_dir().context("Failed to determine home directory")?;

    let config: Config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });

    let guard = Logger::init_tracing(&config.logging)
        .await
        .context("Failed to initialize logging")?;

    let start: PathBuf = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let start: PathBuf = std::path::absolute(&start)
        .with_context(|| format!("Failed to resolve {}", start.display()))?;

    let (mut nav, events) = Navigator::new(&config, &start, DEFAULT_HEIGHT)
        .context("Failed to initialize navigator")?;

    for (what, result) in [
        ("marks", nav.read_marks().await),
        ("tags", nav.read_tags().await),
    ] {
        if let Err(e) = result {
            warn!("reading {}: {}", what, e);
        }
    }
    if let Err(e) = nav.sync().await {
        warn!("initial sync: {}", e);
    }
    if let Err(e) = nav.connect().await {
        warn!("connecting to server: {}", e);
    }

    info!(
        marker = "APP_START",
        operation_type = "startup",
        start = %start.display(),
        "trek started"
    );

    let exit: Exit = Driver::new(nav, events, config.options.period)
        .run()
        .await
        .context("Driver runtime error")?;

    drop(guard);

    match exit {
        Exit::Quit => Ok(()),
        Exit::Signal => std::process::exit(SIGNAL_EXIT_CODE),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Quit,
    Signal,
}

enum Flow {
    Continue,
    Quit,
}

struct Driver {
    nav: Navigator,
    events: EventLoop,
    ticker: Option<Interval>,
}

impl Driver {
    fn new(nav: Navigator, events: EventLoop, period: Duration) -> Self {
        let ticker: Option<Interval> = (!period.is_zero()).then(|| {
            let mut ticker: Interval = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        Self { nav, events, ticker }
    }

    async fn run(mut self) -> Result<Exit> {
        let mut lines: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();

        let mut hangup: Signal = signal(SignalKind::hangup()).context("SIGHUP handler")?;
        let mut quit: Signal = signal(SignalKind::quit()).context("SIGQUIT handler")?;
        let mut terminate: Signal = signal(SignalKind::terminate()).context("SIGTERM handler")?;

        self.print_status();

        let exit: Exit = loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line.context("Failed to read stdin")? {
                        Some(line) => {
                            if let Flow::Quit = self.run_command(line.trim()).await {
                                break Exit::Quit;
                            }
                            self.print_status();
                        }
                        None => break Exit::Quit,
                    }
                }

                update = self.events.next() => {
                    let Some(update) = update else {
                        break Exit::Quit;
                    };
                    if let Some(note) = self.nav.apply(update) {
                        println!("{note}");
                    }
                    self.print_status();
                }

                _ = tick(&mut self.ticker) => {
                    self.nav.renew();
                    self.nav.load_file(false);
                }

                _ = hangup.recv() => break Exit::Signal,
                _ = quit.recv() => break Exit::Signal,
                _ = terminate.recv() => break Exit::Signal,
            }
        };

        info!(
            marker = "APP_EXIT",
            operation_type = "shutdown",
            signal = (exit == Exit::Signal),
            "Shutting down"
        );

        if let Err(e) = self.nav.shutdown().await {
            error!("shutdown: {}", e);
            eprintln!("{e}");
        }

        Ok(exit)
    }

    fn print_status(&self) {
        let entry: String = self
            .nav
            .curr_file()
            .map(|f| f.name.to_string())
            .unwrap_or_default();

        if self.nav.progress.is_idle() {
            println!("{} {}", self.nav.cwd().display(), entry);
        } else {
            println!("{} {} {}", self.nav.cwd().display(), entry, self.nav.progress);
        }
    }

    async fn run_command(&mut self, line: &str) -> Flow {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg: &str = arg.trim();
        let count: usize = arg.parse().unwrap_or(1);
        let nav: &mut Navigator = &mut self.nav;

        let result: trek_core::error::AppResult<()> = match cmd {
            "" => Ok(()),
            "quit" => return Flow::Quit,

            "up" => ok(nav.up(count)),
            "down" => ok(nav.down(count)),
            "page-up" => ok(nav.page_up()),
            "page-down" => ok(nav.page_down()),
            "half-up" => ok(nav.half_up()),
            "half-down" => ok(nav.half_down()),
            "scroll-up" => ok(nav.scroll_up(count)),
            "scroll-down" => ok(nav.scroll_down(count)),
            "top" => ok(nav.top()),
            "bottom" => ok(nav.bottom()),
            "high" => ok(nav.high()),
            "middle" => ok(nav.middle()),
            "low" => ok(nav.low()),

            "open" => nav.open(),
            "updir" => {
                nav.updir();
                Ok(())
            }
            "cd" => nav.cd(if arg.is_empty() { "~" } else { arg }),
            "select" => nav.select(arg),
            "jump-prev" => nav.jump_prev(),
            "jump-next" => nav.jump_next(),
            "rename" => match arg.split_once(' ') {
                Some((old, new)) => nav.rename(Path::new(old), Path::new(new.trim())).await,
                None => Err(trek_core::AppError::invalid_input("rename", "usage: rename OLD NEW")),
            },

            "find" => {
                let (found, _) = nav.find(arg, false);
                report_found(found, arg);
                Ok(())
            }
            "find-back" => {
                let (found, _) = nav.find(arg, true);
                report_found(found, arg);
                Ok(())
            }
            "find-next" => ok(nav.find_next()),
            "find-prev" => ok(nav.find_prev()),
            "search" => nav.search(arg, false).map(|found| report_found(found, arg)),
            "search-back" => nav.search(arg, true).map(|found| report_found(found, arg)),
            "search-next" => nav.search_next().map(|_| ()),
            "search-prev" => nav.search_prev().map(|_| ()),

            "toggle" => {
                nav.toggle();
                Ok(())
            }
            "invert" => {
                nav.invert();
                Ok(())
            }
            "unselect" => {
                nav.unselect();
                Ok(())
            }
            "glob-select" => nav.glob_sel(arg, false),
            "glob-unselect" => nav.glob_sel(arg, true),
            "filter" => {
                let patterns: Vec<String> = arg.split_whitespace().map(str::to_string).collect();
                nav.set_filter(&patterns)
            }
            "tag" => nav.tag(arg),
            "tag-toggle" => nav.tag_toggle(arg),

            "mark-save" => match first_char(arg) {
                Some(c) => nav.mark_save(c).await,
                None => Ok(()),
            },
            "mark-load" => match first_char(arg) {
                Some(c) => nav.mark_load(c),
                None => Ok(()),
            },
            "mark-remove" => match first_char(arg) {
                Some(c) => nav.mark_remove(c).await,
                None => Ok(()),
            },
            "sync" => nav.sync().await,

            "copy" => nav.save(BufferMode::Copy).await,
            "cut" => nav.save(BufferMode::Move).await,
            "paste" => nav.paste().await.map(|_| ()),
            "delete" => nav.del().map(|_| ()),
            "calcdirsize" => nav.calc_dir_size().await,

            "reload" => {
                nav.reload();
                Ok(())
            }
            "renew" => {
                nav.renew();
                Ok(())
            }
            "sort" => {
                nav.sort();
                Ok(())
            }
            "hidden" => {
                nav.options.sort.hidden = !nav.options.sort.hidden;
                nav.sort();
                Ok(())
            }
            "reverse" => {
                nav.options.sort.reverse = !nav.options.sort.reverse;
                nav.sort();
                Ok(())
            }

            other => Err(trek_core::AppError::invalid_input(
                "command",
                format!("unknown command: {other}"),
            )),
        };

        match result {
            Ok(()) => self.nav.load_file(false),
            Err(e) => {
                warn!(command = cmd, "command failed: {}", e);
                println!("{}", Notification::error(e.to_string()));
            }
        }

        Flow::Continue
    }
}

fn ok<T>(_: T) -> trek_core::error::AppResult<()> {
    Ok(())
}

fn first_char(arg: &str) -> Option<char> {
    arg.chars().next()
}

fn report_found(found: bool, pattern: &str) {
    if !found {
        println!("{}", Notification::error(format!("not found: {pattern}")));
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        error!("Application panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start_dir_is_optional() {
        let cli = Cli::try_parse_from(["trek"]).unwrap();
        assert_eq!(cli.dir, None);

        let cli = Cli::try_parse_from(["trek", "/tmp/some dir"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/some dir")));

        assert!(Cli::try_parse_from(["trek", "a", "b"]).is_err());
    }
}
