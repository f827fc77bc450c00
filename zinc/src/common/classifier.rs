// vim: tw=80

//! Maps a raw operation code to the scheduler's internal request
//! direction.

/// The operation code presented by the block layer at insert time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpCode {
    Read,
    Write,
    ZoneReset,
    ZoneFinish,
    ZoneAppend,
    Other,
}

/// The scheduler's internal routing class for a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Read,
    Write,
    Reset,
    Finish,
    Other,
}

/// Classify a raw operation code. Zone-append routes to `Other`: ZINC
/// does not support it, and `Other` is rejected at insert rather than
/// funneled anywhere dispatchable.
pub fn classify(op: OpCode) -> Direction {
    match op {
        OpCode::Read => Direction::Read,
        OpCode::Write => Direction::Write,
        OpCode::ZoneReset => Direction::Reset,
        OpCode::ZoneFinish => Direction::Finish,
        OpCode::ZoneAppend | OpCode::Other => Direction::Other,
    }
}
