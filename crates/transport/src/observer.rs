//! Inbound frame observers

/// Receives every inbound text frame, correlated or not
///
/// Called on the reader task. Implementations must return quickly; anything
/// slow belongs on a spawned task.
pub trait FrameObserver: Send + Sync {
    fn on_frame(&self, frame: &str);
}

impl<F> FrameObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_frame(&self, frame: &str) {
        self(frame)
    }
}

/// Receives id-less frames (notifications) already parsed
pub trait NotificationSink: Send + Sync {
    fn on_notification(&self, method: &str, params: &serde_json::Value);
}
