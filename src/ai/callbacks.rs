//! Callback contract for streamed generations.
//!
//! For one request, either some `on_message` calls followed by exactly one
//! `on_complete` happen, or exactly one `on_error` does. Never both.

use crate::Error;

pub trait StreamCallbacks: Send {
    /// One incremental text delta; accumulating them is the caller's job.
    fn on_message(&mut self, content: &str);
    /// The final asset URL. Fires at most once.
    fn on_complete(&mut self, url: &str);
    fn on_error(&mut self, error: Error);
}

type TextFn = Box<dyn FnMut(&str) + Send>;
type ErrorFn = Box<dyn FnMut(Error) + Send>;

/// Adapts three closures to [`StreamCallbacks`].
pub struct FnCallbacks {
    on_message: TextFn,
    on_complete: TextFn,
    on_error: ErrorFn,
}

impl FnCallbacks {
    pub fn new(
        on_message: impl FnMut(&str) + Send + 'static,
        on_complete: impl FnMut(&str) + Send + 'static,
        on_error: impl FnMut(Error) + Send + 'static,
    ) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }
}

impl StreamCallbacks for FnCallbacks {
    fn on_message(&mut self, content: &str) {
        (self.on_message)(content)
    }

    fn on_complete(&mut self, url: &str) {
        (self.on_complete)(url)
    }

    fn on_error(&mut self, error: Error) {
        (self.on_error)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fn_callbacks_forward_to_closures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (m, c, e) = (log.clone(), log.clone(), log.clone());

        let mut callbacks = FnCallbacks::new(
            move |text| m.lock().unwrap().push(format!("message:{text}")),
            move |url| c.lock().unwrap().push(format!("complete:{url}")),
            move |err| e.lock().unwrap().push(format!("error:{err}")),
        );

        callbacks.on_message("hi");
        callbacks.on_complete("https://x/y.png");
        callbacks.on_error(Error::NoResponseBody);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "message:hi".to_string(),
                "complete:https://x/y.png".to_string(),
                "error:No response body".to_string(),
            ]
        );
    }
}
