use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! rewrite_error {
    ($method:expr, $fmt:expr) => {
        crate::Error::Rewrite {
            method: $method.to_string(),
            message: $fmt.to_string(),
        }
    };

    ($method:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Rewrite {
            method: $method.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The taxonomy is deliberately small. Methods that are not eligible for weaving, or that the
/// listener resolver declines, are *not* errors: they pass through unchanged. Everything in this
/// enum aborts the weaving pass of the class that produced it, because a partially rewritten
/// method would fail to load and break every caller.
///
/// # Error Categories
///
/// ## Class File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the input buffer
/// - [`Error::NotSupported`] - Input is not a class file, or uses an unsupported feature
/// - [`Error::Empty`] - Empty input provided
///
/// ## Weaving Errors
/// - [`Error::Rewrite`] - A method body could not be rewritten consistently
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - [`crate::ClassFile::from_path`] could not read the file
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{ClassWeaver, Error, WeaveConfig};
///
/// let bytes = std::fs::read("Sample.class")?;
/// let resolver = |_label: &str, _bytes: &[u8]| Some(());
/// let config = WeaveConfig::default();
/// let mut weaver = ClassWeaver::new(&resolver, &config);
///
/// match weaver.weave(&bytes) {
///     Ok(woven) => println!("{} bytes, instrumented: {}", woven.len(), weaver.was_instrumented()),
///     Err(Error::Rewrite { method, message }) => eprintln!("{method}: {message}"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed class: {message} ({file}:{line})");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Class file parsing Errors
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This input is not supported.
    ///
    /// Returned when the magic number does not identify a class file.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A method body could not be rewritten into a structurally valid body.
    ///
    /// The class that contains the method must be left unwoven.
    ///
    /// # Fields
    ///
    /// * `method` - Monitoring label (or name and descriptor) of the failing method
    /// * `message` - What made the rewrite inconsistent
    #[error("Failed to rewrite {method}: {message}")]
    Rewrite {
        /// The method that failed to rewrite
        method: String,
        /// Description of the inconsistency
        message: String,
    },

    /// Reading a class file from disk failed.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
