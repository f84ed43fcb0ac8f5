//! Host application.
//! Owns the stylesheet, reloads it when the watch handle reports a change,
//! and applies commands from the user.

use crate::config::{self, Settings};
use crate::domain::{SchedulerState, Stylesheet};
use crate::ports::{CommandSource, HostCommand, PathWatcher, StylesheetSink};
use crate::scheduler::WatchHandle;
use anyhow::{Context, Result};
use chrono::Local;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DISPATCH_SLICE: Duration = Duration::from_millis(25);
const COMMAND_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub reloads: usize,
    pub failed_reloads: usize,
    pub warnings: usize,
}

pub struct App<S: StylesheetSink + 'static> {
    handle: WatchHandle,
    sink: Rc<RefCell<S>>,
    stats: Rc<RefCell<Stats>>,
    /// Where to remember the last stylesheet, if anywhere.
    remember_in: Option<PathBuf>,
    pub should_quit: bool,
}

/// Read `path` into a fresh stylesheet.
pub fn load_stylesheet(path: &Path) -> Result<Stylesheet> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read stylesheet {}", path.display()))?;
    Ok(Stylesheet::new(path, contents, Local::now()))
}

/// Watch registration needs a parent directory, so relative paths are
/// resolved against the working directory up front.
fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve stylesheet path {}", path.display()))
}

fn reload_into<S: StylesheetSink>(path: &Path, sink: &mut S) -> Result<()> {
    let sheet = load_stylesheet(path)?;
    sink.apply(&sheet)
}

impl<S: StylesheetSink + 'static> App<S> {
    pub fn new(watcher: Arc<dyn PathWatcher>, sink: S, settings: &Settings) -> Result<Self> {
        let path = settings
            .stylesheet
            .as_deref()
            .context("No stylesheet given. Pass a path or set STYLEWATCH_STYLESHEET.")?;
        let path = absolute_path(path)?;

        let sink = Rc::new(RefCell::new(sink));
        reload_into(&path, &mut *sink.borrow_mut())?;

        let stats = Rc::new(RefCell::new(Stats::default()));
        let mut handle = WatchHandle::new(watcher, path.clone());
        handle.configure(path, settings.delay);

        {
            let target = handle.target().clone();
            let sink = Rc::clone(&sink);
            let stats = Rc::clone(&stats);
            handle.on_result(move |changed| {
                if !changed {
                    return;
                }
                let path = target.snapshot();
                match reload_into(&path, &mut *sink.borrow_mut()) {
                    Ok(()) => stats.borrow_mut().reloads += 1,
                    Err(err) => {
                        warn!(error = %format!("{:#}", err), "reload failed");
                        stats.borrow_mut().failed_reloads += 1;
                    }
                }
            });
        }
        {
            let stats = Rc::clone(&stats);
            handle.on_warning(move |warning| {
                warn!(
                    path = %warning.path.display(),
                    reason = %warning.reason,
                    "not watching; pick another stylesheet to resume"
                );
                stats.borrow_mut().warnings += 1;
            });
        }

        handle.start().context("Failed to start watching")?;

        Ok(Self {
            handle,
            sink,
            stats,
            remember_in: None,
            should_quit: false,
        })
    }

    /// Persist every successful retarget to `config_path`.
    pub fn remember_in(mut self, config_path: PathBuf) -> Self {
        self.remember_in = Some(config_path);
        self
    }

    pub fn run(&mut self, commands: &dyn CommandSource) -> Result<()> {
        while !self.should_quit {
            self.handle.dispatch_blocking(DISPATCH_SLICE);

            if let Some(command) = commands.poll_command(COMMAND_SLICE)? {
                self.handle_command(command);
            }
        }
        self.handle.stop();
        Ok(())
    }

    /// Apply one command. Failures are logged and counted; none of them
    /// ends the session.
    pub fn handle_command(&mut self, command: HostCommand) {
        let outcome = match command {
            HostCommand::Quit => {
                self.should_quit = true;
                Ok(())
            }
            HostCommand::Reload => self.reload_now(),
            HostCommand::Retarget(path) => self.retarget(&path).map(|_| ()),
        };
        if let Err(err) = outcome {
            warn!(error = %format!("{:#}", err), "command failed");
            self.stats.borrow_mut().failed_reloads += 1;
        }
    }

    /// Watch `path` instead. Paths that are not regular files are ignored,
    /// and the current watch keeps running. Returns whether the switch
    /// happened.
    pub fn retarget(&mut self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            warn!(path = %path.display(), "ignoring stylesheet that is not a file");
            return Ok(false);
        }
        let path = absolute_path(path)?;
        let path = path.as_path();

        reload_into(path, &mut *self.sink.borrow_mut())?;
        let delay = self.handle.delay();
        self.handle.configure(path, delay);
        self.handle.restart().context("Failed to restart watching")?;
        info!(path = %path.display(), "switched stylesheet");

        if let Some(config_path) = &self.remember_in {
            if let Err(err) = config::save_stylesheet(config_path, path) {
                warn!(error = %format!("{:#}", err), "could not remember stylesheet");
            }
        }
        Ok(true)
    }

    pub fn reload_now(&mut self) -> Result<()> {
        let path = self.handle.target().snapshot();
        reload_into(&path, &mut *self.sink.borrow_mut())?;
        self.stats.borrow_mut().reloads += 1;
        Ok(())
    }

    pub fn current_target(&self) -> PathBuf {
        self.handle.target().snapshot().as_ref().clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.handle.state()
    }

    pub fn stats(&self) -> Stats {
        self.stats.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::NotifyPathWatcher;
    use crate::cancel::CancelToken;
    use crate::error::WatchError;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;

    /// `Some(changed)` answers at once; `None` blocks until cancelled.
    struct FakeWatcher {
        script: Mutex<VecDeque<Option<Result<bool, String>>>>,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FakeWatcher {
        fn new(script: Vec<Option<Result<bool, String>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<PathBuf> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl PathWatcher for FakeWatcher {
        fn watch_once(&self, target: &Path, cancel: &CancelToken) -> Result<bool, WatchError> {
            self.seen.lock().unwrap().push(target.to_path_buf());
            let step = self.script.lock().unwrap().pop_front().flatten();
            match step {
                Some(Ok(changed)) => Ok(changed),
                Some(Err(reason)) => Err(WatchError::not_watchable(target, reason)),
                None => {
                    while !cancel.is_cancelled() {
                        thread::sleep(Duration::from_millis(2));
                    }
                    Err(WatchError::Interrupted)
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        applied: Vec<(PathBuf, String)>,
    }

    impl StylesheetSink for RecordingSink {
        fn apply(&mut self, sheet: &Stylesheet) -> Result<()> {
            self.applied.push((sheet.path.clone(), sheet.contents.clone()));
            Ok(())
        }
    }

    struct ScriptedCommands {
        commands: RefCell<VecDeque<HostCommand>>,
    }

    impl CommandSource for ScriptedCommands {
        fn poll_command(&self, _timeout: Duration) -> Result<Option<HostCommand>> {
            Ok(self.commands.borrow_mut().pop_front())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config_css: PathBuf,
        theme_css: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config_css = dir.path().join("config.css");
            let theme_css = dir.path().join("theme.css");
            fs::write(&config_css, ".btn { color: red; }\n").unwrap();
            fs::write(&theme_css, ".btn { color: blue; }\n").unwrap();
            Self {
                dir,
                config_css,
                theme_css,
            }
        }

        fn settings(&self) -> Settings {
            Settings {
                stylesheet: Some(self.config_css.clone()),
                delay: Duration::from_millis(5),
                poll_interval: Duration::from_millis(5),
            }
        }
    }

    fn tick_until<S: StylesheetSink + 'static>(app: &mut App<S>, mut condition: impl FnMut(&App<S>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition(app) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            app.handle.dispatch_blocking(Duration::from_millis(20));
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn new_applies_initial_sheet_and_starts_watching() {
        let fx = Fixture::new();
        let app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();

        assert_eq!(
            app.sink.borrow().applied,
            vec![(fx.config_css.clone(), ".btn { color: red; }\n".to_string())]
        );
        assert_eq!(app.state(), SchedulerState::Running);
        assert_eq!(app.current_target(), fx.config_css);
    }

    #[test]
    fn new_without_stylesheet_fails() {
        let settings = Settings {
            stylesheet: None,
            delay: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
        };
        let result = App::new(FakeWatcher::new(vec![]), RecordingSink::default(), &settings);
        assert!(result.is_err());
    }

    #[test]
    fn change_result_reloads_new_contents() {
        let fx = Fixture::new();
        let watcher = FakeWatcher::new(vec![Some(Ok(true))]);
        let mut app = App::new(watcher, RecordingSink::default(), &fx.settings()).unwrap();
        fs::write(&fx.config_css, ".btn { color: green; }\n").unwrap();

        tick_until(&mut app, |app| app.stats().reloads == 1);

        let sink = app.sink.borrow();
        assert_eq!(sink.applied.len(), 2);
        assert_eq!(sink.applied[1].1, ".btn { color: green; }\n");
    }

    #[test]
    fn unchanged_result_does_not_reload() {
        let fx = Fixture::new();
        let watcher = FakeWatcher::new(vec![Some(Ok(false)), Some(Ok(true))]);
        let mut app = App::new(watcher, RecordingSink::default(), &fx.settings()).unwrap();

        tick_until(&mut app, |app| app.stats().reloads == 1);

        assert_eq!(app.sink.borrow().applied.len(), 2);
    }

    #[test]
    fn reload_failure_is_counted_not_fatal() {
        let fx = Fixture::new();
        let watcher = FakeWatcher::new(vec![Some(Ok(true))]);
        let mut app = App::new(watcher, RecordingSink::default(), &fx.settings()).unwrap();
        fs::remove_file(&fx.config_css).unwrap();

        tick_until(&mut app, |app| app.stats().failed_reloads == 1);

        assert_eq!(app.sink.borrow().applied.len(), 1);
        assert_eq!(app.state(), SchedulerState::Running);
    }

    #[test]
    fn retarget_to_missing_path_is_ignored() {
        let fx = Fixture::new();
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();

        let switched = app.retarget(&fx.dir.path().join("gone.css")).unwrap();

        assert!(!switched);
        assert_eq!(app.current_target(), fx.config_css);
        assert_eq!(app.state(), SchedulerState::Running);
    }

    #[test]
    fn retarget_applies_and_watches_the_new_sheet() {
        let fx = Fixture::new();
        let watcher = FakeWatcher::new(vec![None, Some(Ok(true))]);
        let mut app = App::new(
            Arc::clone(&watcher) as Arc<dyn PathWatcher>,
            RecordingSink::default(),
            &fx.settings(),
        )
        .unwrap();
        wait_until(|| watcher.seen().len() == 1);

        assert!(app.retarget(&fx.theme_css).unwrap());
        tick_until(&mut app, |app| app.stats().reloads == 1);

        let applied: Vec<PathBuf> = app.sink.borrow().applied.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            applied,
            vec![fx.config_css.clone(), fx.theme_css.clone(), fx.theme_css.clone()]
        );
        let seen = watcher.seen();
        assert_eq!(seen[0], fx.config_css);
        assert_eq!(seen[1], fx.theme_css);
    }

    #[test]
    fn retarget_is_remembered_in_config() {
        let fx = Fixture::new();
        let config_path = fx.dir.path().join("stylewatch").join("config.toml");
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings())
            .unwrap()
            .remember_in(config_path.clone());

        app.retarget(&fx.theme_css).unwrap();

        let layer = config::load_file(&config_path).unwrap();
        assert_eq!(layer.stylesheet, Some(fx.theme_css.clone()));
    }

    #[test]
    fn unwatchable_directory_is_counted_and_idles() {
        let fx = Fixture::new();
        let watcher = FakeWatcher::new(vec![Some(Err("permission denied".to_string()))]);
        let mut app = App::new(watcher, RecordingSink::default(), &fx.settings()).unwrap();

        tick_until(&mut app, |app| app.stats().warnings == 1);

        assert_eq!(app.state(), SchedulerState::Idle);
    }

    /// Restores the working directory when dropped.
    struct CwdGuard(PathBuf);

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    fn relative_stylesheet_is_resolved_and_watched() {
        let fx = Fixture::new();
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(fx.dir.path()).unwrap();

        let settings = Settings {
            stylesheet: Some(PathBuf::from("config.css")),
            ..fx.settings()
        };
        let watcher = Arc::new(NotifyPathWatcher::new(Duration::from_millis(10)));
        let mut app = App::new(watcher, RecordingSink::default(), &settings).unwrap();

        let deadline = Instant::now() + Duration::from_millis(400);
        while Instant::now() < deadline {
            app.handle.dispatch_blocking(Duration::from_millis(20));
        }

        assert!(app.current_target().is_absolute());
        assert_eq!(app.current_target().file_name(), fx.config_css.file_name());
        assert_eq!(app.stats().warnings, 0);
        assert_eq!(app.state(), SchedulerState::Running);
    }

    #[test]
    fn retarget_to_directory_is_ignored() {
        let fx = Fixture::new();
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();

        let switched = app.retarget(fx.dir.path()).unwrap();

        assert!(!switched);
        assert_eq!(app.current_target(), fx.config_css);
        assert_eq!(app.sink.borrow().applied.len(), 1);
    }

    #[test]
    fn run_survives_a_bad_retarget() {
        let fx = Fixture::new();
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();
        let commands = ScriptedCommands {
            commands: RefCell::new(VecDeque::from(vec![
                HostCommand::Retarget(fx.dir.path().to_path_buf()),
                HostCommand::Quit,
            ])),
        };

        app.run(&commands).unwrap();

        assert!(app.should_quit);
        assert_eq!(app.current_target(), fx.config_css);
    }

    #[test]
    fn run_survives_reloading_a_deleted_sheet() {
        let fx = Fixture::new();
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();
        fs::remove_file(&fx.config_css).unwrap();
        let commands = ScriptedCommands {
            commands: RefCell::new(VecDeque::from(vec![HostCommand::Reload, HostCommand::Quit])),
        };

        app.run(&commands).unwrap();

        assert!(app.should_quit);
        assert_eq!(app.stats().failed_reloads, 1);
        assert_eq!(app.stats().reloads, 0);
        assert_eq!(app.state(), SchedulerState::Idle);
    }

    #[test]
    fn run_applies_commands_until_quit() {
        let fx = Fixture::new();
        let mut app = App::new(FakeWatcher::new(vec![None]), RecordingSink::default(), &fx.settings()).unwrap();
        let commands = ScriptedCommands {
            commands: RefCell::new(VecDeque::from(vec![
                HostCommand::Reload,
                HostCommand::Retarget(fx.theme_css.clone()),
                HostCommand::Quit,
            ])),
        };

        app.run(&commands).unwrap();

        assert!(app.should_quit);
        assert_eq!(app.state(), SchedulerState::Idle);
        assert_eq!(app.stats().reloads, 1);
        assert_eq!(app.current_target(), fx.theme_css);
        assert_eq!(app.sink.borrow().applied.len(), 3);
    }
}
