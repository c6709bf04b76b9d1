//! Record handlers run as stream records arrive.

use crate::SlideruleError;
use log::{debug, log, Level};
use records::{Record, Value};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

pub const EVENTREC: &str = "eventrec";
pub const EXCEPTREC: &str = "exceptrec";
pub const ARROWREC_META: &str = "arrowrec.meta";
pub const ARROWREC_DATA: &str = "arrowrec.data";

pub type Handler<'a> = Box<dyn FnMut(&Record) -> Result<(), SlideruleError> + 'a>;

/// Caller supplied handlers, keyed by record type.
///
/// Records with a handler are consumed by it and not returned from
/// the request.
#[derive(Default)]
pub struct Handlers<'a> {
    map: HashMap<String, Handler<'a>>,
}

impl<'a> Handlers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, rectype: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&Record) -> Result<(), SlideruleError> + 'a,
    {
        self.map.insert(rectype.into(), Box::new(handler));
        self
    }

    pub(crate) fn get_mut(&mut self, rectype: &str) -> Option<&mut Handler<'a>> {
        self.map.get_mut(rectype)
    }
}

/// Maps a service log level (0 = debug .. 4 = critical).
fn level(rec: &Record) -> Level {
    match rec.get_i64("level") {
        Some(0) => Level::Debug,
        Some(1) => Level::Info,
        Some(2) => Level::Warn,
        _ => Level::Error,
    }
}

pub(crate) fn log_event(rec: &Record, verbose: bool) {
    if verbose {
        log!(level(rec), "{}", rec.get_str("attr").unwrap_or_default());
    }
}

pub(crate) fn log_exception(rec: &Record, verbose: bool) {
    if !verbose {
        return;
    }
    let text = rec.get_str("text").unwrap_or_default();
    match rec.get_i64("code") {
        Some(code) if code >= 0 => log!(level(rec), "Exception <{code}>: {text}"),
        _ => log!(level(rec), "{text}"),
    }
}

struct Transfer {
    out: BufWriter<File>,
    size: u64,
    progress: u64,
}

/// Files streamed back as `arrowrec.meta` followed by `arrowrec.data`
/// records.
#[derive(Default)]
pub(crate) struct ArrowFiles {
    dir: Option<PathBuf>,
    transfers: HashMap<String, Transfer>,
}

impl ArrowFiles {
    pub(crate) fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            transfers: HashMap::new(),
        }
    }

    pub(crate) fn handle(&mut self, rec: &Record) -> Result<(), SlideruleError> {
        self.try_handle(rec)
            .map_err(|e| SlideruleError::Fatal(format!("Failed to process arrow file: {e}")))
    }

    fn try_handle(&mut self, rec: &Record) -> Result<(), SlideruleError> {
        let filename = rec
            .get_str("filename")
            .ok_or_else(|| SlideruleError::Fatal("missing filename".to_owned()))?
            .to_owned();
        if rec.rectype == ARROWREC_META {
            if self.transfers.contains_key(&filename) {
                return Err(SlideruleError::Fatal(
                    "file transfer already in progress".to_owned(),
                ));
            }
            let path = match &self.dir {
                Some(dir) => dir.join(&filename),
                None => PathBuf::from(&filename),
            };
            debug!("receiving {} into {}", filename, path.display());
            let transfer = Transfer {
                out: BufWriter::new(File::create(path)?),
                size: rec.get_i64("size").unwrap_or_default().max(0).unsigned_abs(),
                progress: 0,
            };
            self.transfers.insert(filename, transfer);
        } else {
            let data: Vec<u8> = rec
                .get("data")
                .and_then(Value::as_array)
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_i64)
                .map(|b| b as u8)
                .collect();
            let transfer = self.transfers.get_mut(&filename).ok_or_else(|| {
                SlideruleError::Fatal(format!("no transfer in progress for {filename}"))
            })?;
            transfer.out.write_all(&data)?;
            transfer.progress += data.len() as u64;
            if transfer.progress >= transfer.size {
                if let Some(mut done) = self.transfers.remove(&filename) {
                    done.out.flush()?;
                }
            }
        }
        Ok(())
    }
}
