//! URL downloads: extractor adapter, progress-line parsing, intake and the
//! subprocess-supervising worker.

mod extractor;
mod intake;
mod parse;
mod worker;

pub use extractor::{ExtractError, Extractor, ProbeFormat, ProbeInfo, SpawnSpec, YtDlp};
pub use intake::{StartRequest, UrlIntake};
pub use parse::{LineEvent, classify_line};
