use flate2::{Compression, write::GzEncoder};
use std::fs::File;

/// Output file, possibly gzip compressed
pub enum FileDescriptor {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl std::io::Write for FileDescriptor {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(data),
            Self::Gzip(w) => w.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

impl FileDescriptor {
    /// Creates (or truncates) `filename`
    pub fn new(gzip: bool, filename: &str) -> std::io::Result<Self> {
        let fd = File::create(filename)?;

        if gzip {
            let compression = Compression::new(5);
            Ok(Self::Gzip(GzEncoder::new(fd, compression)))
        } else {
            Ok(Self::Plain(fd))
        }
    }

    /// Terminates the gzip stream, if any
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => std::io::Write::flush(&mut w),
            Self::Gzip(w) => w.finish().map(|_| ()),
        }
    }
}
