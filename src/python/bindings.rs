//! Python bindings for the tokenbind tokenizer.
//!
//! The Python `Tokenizer` wraps a [`TokenizerHandle`], so it can be released
//! explicitly with `close()` or by leaving a `with` block; any call after that
//! raises `RuntimeError`.
//!
//! # Example
//!
//! ```python
//! from tokenbind import Tokenizer
//!
//! with Tokenizer.from_file("tokenizer.json") as tokenizer:
//!     ids, tokens = tokenizer.encode("Hello, world!")
//!     text = tokenizer.decode(ids)
//! ```

use pyo3::exceptions::{
    PyConnectionError, PyFileNotFoundError, PyIOError, PyRuntimeError, PyValueError,
};
use pyo3::prelude::*;

use crate::core::{
    CacheResolver, EncodeOptions, Encoding, ErrorKind, TokenizerError, TokenizerHandle,
};

/// Map a tokenizer error to the closest Python exception.
fn to_py_err(err: TokenizerError) -> PyErr {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::NotFound => PyFileNotFoundError::new_err(message),
        ErrorKind::Parse | ErrorKind::InvalidInput => PyValueError::new_err(message),
        ErrorKind::Network => PyConnectionError::new_err(message),
        ErrorKind::Io => PyIOError::new_err(message),
        ErrorKind::Closed => PyRuntimeError::new_err(message),
    }
}

/// Result of `Tokenizer.encode_with_options`.
#[pyclass(name = "Encoding")]
pub struct PyEncoding {
    inner: Encoding,
}

#[pymethods]
impl PyEncoding {
    #[getter]
    fn ids(&self) -> Vec<u32> {
        self.inner.ids.clone()
    }

    #[getter]
    fn tokens(&self) -> Vec<String> {
        self.inner.tokens.clone()
    }

    /// Segment ids, or None if not requested.
    #[getter]
    fn type_ids(&self) -> Option<Vec<u32>> {
        self.inner.type_ids.clone()
    }

    #[getter]
    fn attention_mask(&self) -> Option<Vec<u32>> {
        self.inner.attention_mask.clone()
    }

    #[getter]
    fn special_tokens_mask(&self) -> Option<Vec<u32>> {
        self.inner.special_tokens_mask.clone()
    }

    /// `(start, end)` byte offsets into the input, or None if not requested.
    #[getter]
    fn offsets(&self) -> Option<Vec<(usize, usize)>> {
        self.inner.offsets.clone()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!("Encoding(num_tokens={})", self.inner.len())
    }
}

/// Python wrapper for a tokenizer handle.
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    handle: TokenizerHandle,
}

#[pymethods]
impl PyTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    ///
    /// Raises:
    ///     FileNotFoundError: If the file does not exist
    ///     ValueError: If the file is not a valid tokenizer description
    #[staticmethod]
    fn from_file(path: &str) -> PyResult<Self> {
        let handle = TokenizerHandle::from_file(path).map_err(to_py_err)?;
        Ok(Self { handle })
    }

    /// Load a tokenizer from the bytes of a `tokenizer.json` document.
    #[staticmethod]
    fn from_bytes(data: &[u8]) -> PyResult<Self> {
        let handle = TokenizerHandle::from_bytes(data).map_err(to_py_err)?;
        Ok(Self { handle })
    }

    /// Load a named model from the local tokenizer cache.
    ///
    /// Args:
    ///     name: Model name, `name` or `org/name`
    ///     cache_dir: Cache root; defaults to $TOKENIZERS_CACHE or ~/.cache/tokenizers
    #[staticmethod]
    #[pyo3(signature = (name, cache_dir=None))]
    fn from_pretrained(name: &str, cache_dir: Option<&str>) -> PyResult<Self> {
        let handle = match cache_dir {
            Some(dir) => TokenizerHandle::from_pretrained_with(name, &CacheResolver::new(dir)),
            None => TokenizerHandle::from_pretrained(name),
        }
        .map_err(to_py_err)?;
        Ok(Self { handle })
    }

    /// Encode text.
    ///
    /// Returns:
    ///     Tuple of (ids, tokens)
    #[pyo3(signature = (text, add_special_tokens=false))]
    fn encode(&self, text: &str, add_special_tokens: bool) -> PyResult<(Vec<u32>, Vec<String>)> {
        let encoding = self
            .handle
            .encode(text, add_special_tokens)
            .map_err(to_py_err)?;
        Ok((encoding.ids, encoding.tokens))
    }

    /// Encode text and return the requested attributes as an `Encoding`.
    #[pyo3(signature = (
        text,
        add_special_tokens=false,
        return_type_ids=false,
        return_attention_mask=false,
        return_special_tokens_mask=false,
        return_offsets=false,
        return_all=false
    ))]
    #[allow(clippy::too_many_arguments)]
    fn encode_with_options(
        &self,
        text: &str,
        add_special_tokens: bool,
        return_type_ids: bool,
        return_attention_mask: bool,
        return_special_tokens_mask: bool,
        return_offsets: bool,
        return_all: bool,
    ) -> PyResult<PyEncoding> {
        let options = if return_all {
            EncodeOptions::all()
        } else {
            EncodeOptions {
                return_type_ids,
                return_attention_mask,
                return_special_tokens_mask,
                return_offsets,
            }
        };
        let inner = self
            .handle
            .encode_with_options(text, add_special_tokens, &options)
            .map_err(to_py_err)?;
        Ok(PyEncoding { inner })
    }

    /// Batch encode multiple texts in parallel; returns a list of id lists.
    #[pyo3(signature = (texts, add_special_tokens=false))]
    fn encode_batch(&self, texts: Vec<String>, add_special_tokens: bool) -> PyResult<Vec<Vec<u32>>> {
        let tokenizer = self.handle.tokenizer().map_err(to_py_err)?;
        let encodings = tokenizer
            .encode_batch(&texts, add_special_tokens, &EncodeOptions::default())
            .map_err(to_py_err)?;
        Ok(encodings.into_iter().map(|e| e.ids).collect())
    }

    /// Decode token ids to text.
    ///
    /// Raises:
    ///     ValueError: If an id is outside the vocabulary
    #[pyo3(signature = (ids, skip_special_tokens=false))]
    fn decode(&self, ids: Vec<u32>, skip_special_tokens: bool) -> PyResult<String> {
        self.handle
            .decode(&ids, skip_special_tokens)
            .map_err(to_py_err)
    }

    /// Batch decode multiple id lists in parallel.
    #[pyo3(signature = (sequences, skip_special_tokens=false))]
    fn decode_batch(
        &self,
        sequences: Vec<Vec<u32>>,
        skip_special_tokens: bool,
    ) -> PyResult<Vec<String>> {
        let tokenizer = self.handle.tokenizer().map_err(to_py_err)?;
        tokenizer
            .decode_batch(&sequences, skip_special_tokens)
            .map_err(to_py_err)
    }

    #[getter]
    fn vocab_size(&self) -> PyResult<usize> {
        self.handle.vocab_size().map_err(to_py_err)
    }

    #[getter]
    fn closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Release the tokenizer. Calling it twice is harmless.
    fn close(&mut self) -> PyResult<()> {
        self.handle.close().map_err(to_py_err)
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc_value=None, _traceback=None))]
    fn __exit__(
        &mut self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc_value: Option<&Bound<'_, PyAny>>,
        _traceback: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<bool> {
        self.close()?;
        Ok(false)
    }

    fn __repr__(&self) -> String {
        match self.handle.tokenizer() {
            Ok(tokenizer) => format!("Tokenizer(vocab_size={})", tokenizer.vocab_size()),
            Err(_) => "Tokenizer(closed)".to_string(),
        }
    }
}
