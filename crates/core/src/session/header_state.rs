/// Header lifecycle latch. Leaves `NotStarted` at most once and never
/// returns to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderState {
    #[default]
    NotStarted,
    StartFailed,
    Started,
}

impl HeaderState {
    /// True once header writing has been attempted, successfully or not.
    pub fn attempted(self) -> bool {
        self != HeaderState::NotStarted
    }

    pub fn is_started(self) -> bool {
        self == HeaderState::Started
    }
}
