//! In-process channel for driving an engine without hardware.
//!
//! [`MemoryChannel`] is the endpoint handed to the engine; [`MemoryHandle`]
//! stays with the test or simulator and plays the device side.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Buf, BytesMut};

use crate::traits::ByteChannel;

#[derive(Debug, Default)]
struct State {
    input: BytesMut,
    output: Vec<u8>,
    replies: Vec<(Vec<u8>, Vec<u8>)>,
    not_writable: bool,
    closed: bool,
    delay_polls: usize,
    countdown: usize,
}

/// Engine side of an in-memory duplex channel.
#[derive(Debug)]
pub struct MemoryChannel {
    state: Rc<RefCell<State>>,
}

/// Device side of a [`MemoryChannel`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Rc<RefCell<State>>,
}

impl MemoryChannel {
    /// Create a connected channel/handle pair.
    pub fn new() -> (MemoryChannel, MemoryHandle) {
        let state = Rc::new(RefCell::new(State::default()));
        (
            MemoryChannel {
                state: Rc::clone(&state),
            },
            MemoryHandle { state },
        )
    }
}

impl ByteChannel for MemoryChannel {
    fn readable(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.input.is_empty() {
            return state.closed;
        }
        if state.countdown > 0 {
            state.countdown -= 1;
            return false;
        }
        true
    }

    fn writable(&mut self) -> bool {
        let state = self.state.borrow();
        state.closed || !state.not_writable
    }

    fn get_byte(&mut self) -> std::io::Result<u8> {
        let mut state = self.state.borrow_mut();
        if state.input.is_empty() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        state.countdown = state.delay_polls;
        Ok(state.input.get_u8())
    }

    fn put_byte(&mut self, byte: u8) -> std::io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        state.output.push(byte);

        let State {
            input,
            output,
            replies,
            ..
        } = &mut *state;
        for (trigger, reply) in replies.iter() {
            if output.ends_with(trigger) {
                input.extend_from_slice(reply);
            }
        }
        Ok(())
    }
}

impl MemoryHandle {
    /// Queue bytes for the engine to read.
    pub fn push_input(&self, data: &[u8]) {
        self.state.borrow_mut().input.extend_from_slice(data);
    }

    /// Number of queued bytes the engine has not read yet.
    pub fn pending_input(&self) -> usize {
        self.state.borrow().input.len()
    }

    /// Everything the engine has written so far.
    pub fn output(&self) -> Vec<u8> {
        self.state.borrow().output.clone()
    }

    /// Drain and return everything the engine has written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().output)
    }

    /// Queue `reply` every time the written stream ends with `trigger`.
    pub fn respond_to(&self, trigger: &[u8], reply: &[u8]) {
        self.state
            .borrow_mut()
            .replies
            .push((trigger.to_vec(), reply.to_vec()));
    }

    /// Stall or release the write side.
    pub fn set_writable(&self, writable: bool) {
        self.state.borrow_mut().not_writable = !writable;
    }

    /// Report each queued byte as not ready for `polls` readiness checks.
    pub fn set_readable_after_polls(&self, polls: usize) {
        let mut state = self.state.borrow_mut();
        state.delay_polls = polls;
        state.countdown = polls;
    }

    /// Simulate the device hanging up once queued input is drained.
    pub fn close(&self) {
        self.state.borrow_mut().closed = true;
    }
}
