pub mod scanner;
pub mod writer;

pub use scanner::{FileScanner, ScannerMode};
pub use writer::FileWriter;
