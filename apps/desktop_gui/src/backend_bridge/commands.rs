//! Backend commands queued from UI to backend worker.

pub enum BackendCommand {
    /// Run one submission of the current selection.
    Submit,
    /// Download the heatmap image behind a controller heatmap reference.
    FetchHeatmap { url: String },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Submit => "submit",
            BackendCommand::FetchHeatmap { .. } => "fetch_heatmap",
        }
    }
}
