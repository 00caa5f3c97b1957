use std::fmt;

/// Unique, strictly increasing session identifier.
pub type SessionId = u64;

/// Identifier of a step within its session.
pub type StepId = u32;

/// Caller-supplied job identity correlated with steps.
pub type JobId = u64;

/// Stable index of a node in the registry arena. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a session.
///
/// The legal sequence is `Undef -> Init -> Schedule -> Allocd`, with
/// `Terminated` reachable from any non-terminal state. `Terminated` is
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Undef,
    Init,
    Schedule,
    Allocd,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Terminated
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Undef, Init) | (Init, Schedule) | (Schedule, Allocd) => true,
            _ => false,
        }
    }

    /// Operator-facing description of the state.
    pub fn description(self) -> &'static str {
        match self {
            SessionState::Undef => "UNDEF",
            SessionState::Init => "PENDING QUEUE ASSIGNMENT",
            SessionState::Schedule => "RUNNING SCHEDULERS",
            SessionState::Allocd => "ALLOCATED",
            SessionState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Undef => "UNDEF",
            SessionState::Init => "INIT",
            SessionState::Schedule => "SCHEDULE",
            SessionState::Allocd => "ALLOCD",
            SessionState::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Allocation state of a node.
///
/// - `Undef`: invalid / not yet registered.
/// - `Unknown`: registered but availability not yet determined (or offline).
/// - `Unalloc`: free.
/// - `Alloc`: held by exactly one step.
/// - `Exclusive`: held by exactly one step, no co-tenancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Undef,
    Unknown,
    Unalloc,
    Alloc,
    Exclusive,
}

impl NodeState {
    pub fn is_allocated(self) -> bool {
        matches!(self, NodeState::Alloc | NodeState::Exclusive)
    }

    /// Operator-facing description of the state.
    pub fn description(self) -> &'static str {
        match self {
            NodeState::Undef => "UNDEF",
            NodeState::Unknown => "UNKNOWN",
            NodeState::Unalloc => "UNALLOCATED",
            NodeState::Alloc => "ALLOCATED",
            NodeState::Exclusive => "EXCLUSIVELY ALLOCATED",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Why a session reached `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Caller cancelled the session.
    Cancelled,
    /// Caller reported normal completion of an allocated session.
    Completed,
    /// No module could schedule the session within the retry bound.
    Starved { attempts: u32 },
    /// The allocation outlived its walltime.
    WalltimeExpired,
    /// The provisioning collaborator reported a failure.
    ProvisionFailed(String),
    /// The engine shut down with the session still live.
    Shutdown,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Cancelled => f.write_str("cancelled"),
            TerminationReason::Completed => f.write_str("completed"),
            TerminationReason::Starved { attempts } => {
                write!(f, "starved after {attempts} scheduling attempts")
            }
            TerminationReason::WalltimeExpired => f.write_str("walltime expired"),
            TerminationReason::ProvisionFailed(msg) => write!(f, "provisioning failed: {msg}"),
            TerminationReason::Shutdown => f.write_str("scheduler shutdown"),
        }
    }
}
