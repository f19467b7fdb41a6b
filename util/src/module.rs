//! Module interfaces
//!
//! Controllers stepped once per camera frame implement [`State`], so that they can be driven and
//! tested without the hardware or network around them.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A cyclic processing module and its internal state.
pub trait State {
    /// Parameters the module is (re)initialised with
    type InitData;
    /// An error raised by invalid parameters
    type InitError;

    /// Data consumed by one cycle
    type InputData;
    /// Data produced by one cycle, normally a demand for the next stage
    type OutputData;
    /// Diagnostics describing one cycle
    type StatusReport;
    /// An error raised when a cycle's input cannot be processed. The module's state must be left
    /// unchanged when it is returned.
    type ProcError;

    /// (Re)initialise the module, discarding all history.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError>;

    /// Run one cycle.
    ///
    /// # Outputs
    /// - On success a tuple of the output data and status report.
    /// - On error a `ProcError` instance.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
