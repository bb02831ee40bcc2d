mod bindings;

pub use bindings::{PyEncoding, PyTokenizer};

use pyo3::prelude::*;

/// tokenbind - tokenizer handles for Python
///
/// Loads `tokenizer.json` descriptions from files, bytes or a local model
/// cache, and exposes encode/decode with an explicit `close()`.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    m.add_class::<PyEncoding>()?;
    Ok(())
}
