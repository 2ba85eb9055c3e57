use tokio::sync::watch;

/// A cancellation context, shared by cloning.
///
/// Cancelling is one-way: once done, a context stays done.
#[derive(Debug, Clone)]
pub struct Context {
    rx: watch::Receiver<bool>,
}

/// The cancelling half of a [`Context`].
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Context {
    /// Create a context along with the handle that cancels it.
    pub fn with_cancel() -> (Self, Canceller) {
        let (tx, rx) = watch::channel(false);
        (Self { rx }, Canceller { tx })
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the context is cancelled. Never resolves for a
    /// context whose canceller was dropped without cancelling.
    pub async fn done(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|done| *done).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn context(&self) -> Context {
        Context {
            rx: self.tx.subscribe(),
        }
    }
}
