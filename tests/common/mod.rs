//! Shared fixtures for integration tests.

use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use switchyard::TaskIo;

/// Write sink that stays readable after the dispatcher consumes the
/// `TaskIo` it lives in.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

#[allow(dead_code)]
impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A `TaskIo` over an in-memory stdin, plus a handle to whatever the
/// dispatch writes.
#[allow(dead_code)]
pub fn io_over(stdin: &[u8]) -> (TaskIo, SharedBuf) {
    let out = SharedBuf::default();
    let io = TaskIo {
        input: Box::new(Cursor::new(stdin.to_vec())),
        output: Box::new(out.clone()),
    };
    (io, out)
}
