//! Simple-query layer: declarative terms, specialized executors, the
//! interpreted fallback, and the shape-dispatch compiler.

pub mod compile;
pub mod exec;
pub mod interp;
pub mod term;

pub use compile::QueryCompiler;
pub use exec::{ExecOutput, RangeSel, ResultCache, SimpleQuery, SubstringPat};
pub use term::QueryTerm;
