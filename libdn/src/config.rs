//! Names used by the channelization pass.
//!
//! Host-side port names are part of the generated interface and are used verbatim. Names of synthesized state
//! (`finishing`, `done_init`, `sim_time`) are only bases: they are uniquified against each module's namespace.

/// Configuration of the channelization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the host clock port.
    pub host_clock: String,

    /// Name of the host reset port.
    pub host_reset: String,

    /// Base name of the wire asserted when the current host cycle completes.
    pub finishing: String,

    /// Base name of the one-shot register set after the first completed host cycle.
    pub done_init: String,

    /// Base name of the simulation-time register.
    pub sim_time: String,

    /// Name of the clock-gate blackbox instantiated for every target clock.
    pub clock_gate: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_clock: "hostClock".to_string(),
            host_reset: "hostReset".to_string(),
            finishing: "targetCycleFinishing".to_string(),
            done_init: "doneInit".to_string(),
            sim_time: "sim_time".to_string(),
            clock_gate: "ClockGateBuffer".to_string(),
        }
    }
}

impl Config {
    /// Sets the host clock port name.
    pub fn with_host_clock<S: Into<String>>(mut self, name: S) -> Self {
        self.host_clock = name.into();
        self
    }

    /// Sets the host reset port name.
    pub fn with_host_reset<S: Into<String>>(mut self, name: S) -> Self {
        self.host_reset = name.into();
        self
    }

    /// Sets the clock-gate blackbox name.
    pub fn with_clock_gate<S: Into<String>>(mut self, name: S) -> Self {
        self.clock_gate = name.into();
        self
    }
}
