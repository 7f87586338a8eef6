use super::*;

fn secs_since_unix_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.)
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct DummyLogger;

/// Keeps lines in memory and dumps them to stderr when dropped.
#[derive(Debug)]
pub struct VecLogger(String, Vec<u8>);

#[derive(Debug)]
pub struct FileLogger(String, std::fs::File);

impl FileLogger {
    pub fn new(source: &str, file: std::fs::File) -> Self {
        Self(source.to_string(), file)
    }
}
impl VecLogger {
    pub fn new(source: &str) -> Self {
        Self(source.to_string(), Default::default())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.1).into_owned()
    }
}
/////////////////
impl Logger for DummyLogger {
    fn line_writer(&mut self) -> Option<&mut dyn std::io::Write> {
        None
    }
}

impl Logger for VecLogger {
    fn line_writer(&mut self) -> Option<&mut dyn std::io::Write> {
        let _ = write!(&mut self.1, "SRC({}) at {:.6} ", self.0, secs_since_unix_epoch());
        Some(self)
    }
}
impl Logger for FileLogger {
    fn line_writer(&mut self) -> Option<&mut dyn std::io::Write> {
        let _ = write!(&mut self.1, "SRC({}) at {:.6} ", self.0, secs_since_unix_epoch());
        Some(&mut self.1)
    }
}
///////////////////
impl Drop for VecLogger {
    fn drop(&mut self) {
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = writeln!(lock, "--- DROP LOG DUMP ---");
        let _ = std::io::Write::write(&mut lock, self.1.as_slice());
    }
}
impl std::io::Write for VecLogger {
    fn flush(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
    fn write(&mut self, data: &[u8]) -> Result<usize, std::io::Error> {
        self.1.extend_from_slice(data);
        Ok(data.len())
    }
}
