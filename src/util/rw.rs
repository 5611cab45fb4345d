use std::{cell::RefCell, fmt::Write, io, path::PathBuf, rc::Rc};

// Mutable shared pointer, for single-threaded use.
pub type RcRefCell<T> = Rc<RefCell<T>>;

fn shared<T>(t: T) -> RcRefCell<T> {
    Rc::new(RefCell::new(t))
}

pub struct StringBuffer {
    s: String,
}

impl StringBuffer {
    pub fn new() -> StringBuffer {
        StringBuffer { s: String::new() }
    }

    pub fn as_str(&self) -> &str {
        self.s.as_str()
    }

    /// Takes the accumulated text, leaving the buffer empty.
    pub fn export_string(&mut self) -> String {
        std::mem::take(&mut self.s)
    }
}

// String only implements fmt::Write
impl io::Write for StringBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let str_rep = std::str::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let res = self.s.write_str(str_rep);
        match res {
            Ok(_) => Ok(buf.len()),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// For convenience, so we can pass around a shared stream writer.
//
// Used for the converter's record output and its user-facing diagnostics,
// so they can go to stdout/stderr, or be captured by tests.
pub struct WriteHandle {
    w: RcRefCell<dyn io::Write>,
}

impl WriteHandle {
    pub fn stdout_write_handle() -> WriteHandle {
        WriteHandle { w: shared(io::stdout()) }
    }

    pub fn stderr_write_handle() -> WriteHandle {
        WriteHandle { w: shared(io::stderr()) }
    }

    pub fn string_buff_write_handle() -> (WriteHandle, RcRefCell<StringBuffer>) {
        let buffer = shared(StringBuffer::new());
        let h = WriteHandle { w: buffer.clone() };
        (h, buffer)
    }
}

impl io::Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The test framework cannot capture direct writes to stdout or stderr,
        // so trace what goes through here.
        tracing::trace!("WriteHandle::write {}", String::from_utf8_lossy(buf));
        self.w.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.borrow_mut().flush()
    }
}

// An export file, tracked along with a name to describe it in errors.
// It may also be pre-read (or generated), in which case we just store the text.
pub enum DescribedReader {
    String((String, String)),
    FilePath(PathBuf),
}

impl DescribedReader {
    pub fn from_string(desc: String, data: String) -> DescribedReader {
        DescribedReader::String((desc, data))
    }

    pub fn from_file_path(path: PathBuf) -> DescribedReader {
        DescribedReader::FilePath(path)
    }

    pub fn desc(&self) -> &str {
        match self {
            DescribedReader::String((name, _)) => name,
            DescribedReader::FilePath(path) => {
                path.to_str().unwrap_or("<unknown path>")
            }
        }
    }

    /// The file name without directory or extension, for naming
    /// derived output files.
    pub fn stem(&self) -> String {
        match self {
            DescribedReader::String((name, _)) => name.clone(),
            DescribedReader::FilePath(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "export".to_string()),
        }
    }

    pub fn read_to_string(&self) -> Result<String, io::Error> {
        match self {
            DescribedReader::String((_, text)) => Ok(text.clone()),
            DescribedReader::FilePath(path) => std::fs::read_to_string(path),
        }
    }
}
