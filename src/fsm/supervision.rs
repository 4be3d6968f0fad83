use tokio::sync::watch;

/// A per-handler "dying" signal, observed in every `tokio::select!` a state
/// handler or its background activities run. Plays the role the source's
/// `CancellationToken` plays: cheap to clone, cheap to observe, and distinct
/// from any real FSM state so a killed handler can never be mistaken for a
/// clean transition.
#[derive(Clone)]
pub struct Supervision {
    dying: watch::Receiver<bool>,
}

pub struct SupervisionHandle {
    tx: watch::Sender<bool>,
}

impl SupervisionHandle {
    pub fn new() -> (SupervisionHandle, Supervision) {
        let (tx, rx) = watch::channel(false);
        (SupervisionHandle { tx }, Supervision { dying: rx })
    }

    /// Ask every clone of the paired [`Supervision`] to die.
    pub fn kill(&self) {
        let _ = self.tx.send(true);
    }
}

impl Supervision {
    /// Resolves once [`SupervisionHandle::kill`] has been called. Intended
    /// as a `tokio::select!` branch alongside other work.
    pub async fn killed(&mut self) {
        let _ = self.dying.wait_for(|dying| *dying).await;
    }

    pub fn is_dying(&self) -> bool {
        *self.dying.borrow()
    }
}
