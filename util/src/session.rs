//! Session management
//!
//! A session is one execution of a docking executable. It owns a timestamped directory under
//! `$DOCK_SW_ROOT/<sessions_dir>/` holding:
//!
//! - `<exec_name>.log` - the log file
//! - `arch/` - JSON archives, written by a background thread through [`save`]
//! - `video/` - video artifacts recorded during docking

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::warn;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();
static SAVE_SENDER: OnceCell<Mutex<Sender<SaveRequest>>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Debug, Clone)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The root directory for this session's archives
    pub arch_root: PathBuf,

    /// The directory in which video artifacts recorded in this session are stored
    pub video_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

/// Archive-relative path and the data to write there
type SaveRequest = (PathBuf, Box<dyn Serialize + Send>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (DOCK_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the \
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,

    #[error("Cannot start the archive thread: {0}")]
    CannotStartSaveThread(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}` and start the
    /// archive thread. Only one session may be started per process.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        // Set the session epoch
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = SESSION_EPOCH
            .get()
            .ok_or(SessionError::CannotGetEpoch)?
            .format(TIMESTAMP_FORMAT);

        // Build the session path
        let mut path = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;
        path.push(sessions_dir);
        path.push(format!("{}_{}", exec_name, timestamp));

        // Create the session, archive and video directories
        let arch_root = path.join("arch");
        let video_root = path.join("video");
        for dir in [&path, &arch_root, &video_root].iter() {
            fs::create_dir_all(dir).map_err(SessionError::CannotCreateDir)?;
        }

        // Start archiving
        let (tx, rx) = channel();
        let thread_root = arch_root.clone();
        thread::Builder::new()
            .name("session_save".into())
            .spawn(move || save_thread(thread_root, rx))
            .map_err(SessionError::CannotStartSaveThread)?;
        SAVE_SENDER.init_once(|| Mutex::new(tx));

        Ok(Session {
            log_file_path: path.join(format!("{}.log", exec_name)),
            session_root: path,
            arch_root,
            video_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// If the session has not been started `NaN` is returned.
pub fn get_elapsed_seconds() -> f64 {
    SESSION_EPOCH
        .get()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

/// Return the session's epoch, or `None` if no session has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

/// Queue data to be written as JSON at the given path, relative to the session's archive
/// directory.
///
/// Writing happens on the archive thread so this never blocks on the filesystem. If no session
/// has been started the data is discarded with a warning.
pub fn save<P: AsRef<Path>, T: Serialize + Send + 'static>(path: P, data: T) {
    let path = path.as_ref().to_path_buf();

    let sender = match SAVE_SENDER.get() {
        Some(s) => s,
        None => {
            warn!("Cannot archive {:?} as the session is not initialised", path);
            return
        }
    };

    match sender.lock() {
        Ok(s) => {
            if let Err(e) = s.send((path, Box::new(data))) {
                warn!("Archive thread has stopped, {:?} not saved", (e.0).0);
            }
        },
        Err(_) => warn!("Archive sender lock poisoned, {:?} not saved", path)
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn save_thread(arch_root: PathBuf, receiver: Receiver<SaveRequest>) {
    // Runs until every sender is dropped, which for the static sender is process exit
    for (path, data) in receiver.iter() {
        if let Err(e) = write_json(&arch_root.join(&path), data.as_ref()) {
            warn!("Could not archive {:?}: {}", path, e);
        }
    }
}

/// Write data as pretty JSON, creating parent directories as needed.
fn write_json(full_path: &Path, data: &(dyn Serialize + Send)) -> Result<(), String> {
    match full_path.extension().and_then(|s| s.to_str()) {
        Some("json") => (),
        ext => return Err(format!("unsupported extension {:?}", ext))
    }

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let file = File::create(full_path).map_err(|e| e.to_string())?;

    serde_json::to_writer_pretty(&file, data).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
