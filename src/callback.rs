/// Callable container used by the loop queues, timers, and continuation
/// slots. Holds either a one-shot callable (move-only captures allowed) or a
/// reusable one; invocation erases the distinction. A spent one-shot is a
/// no-op.
pub enum Callback<A = ()> {
    Once(Option<Box<dyn FnOnce(A)>>),
    Reusable(Box<dyn FnMut(A)>),
}

impl<A> Callback<A> {
    pub fn once<F>(f: F) -> Self
    where
        F: FnOnce(A) + 'static,
    {
        Callback::Once(Some(Box::new(f)))
    }

    pub fn reusable<F>(f: F) -> Self
    where
        F: FnMut(A) + 'static,
    {
        Callback::Reusable(Box::new(f))
    }

    pub fn invoke(&mut self, arg: A) {
        match self {
            Callback::Once(slot) => {
                if let Some(f) = slot.take() {
                    f(arg);
                }
            }
            Callback::Reusable(f) => f(arg),
        }
    }

    /// Consuming form for single-use call sites.
    pub fn call(mut self, arg: A) {
        self.invoke(arg);
    }

    pub fn is_spent(&self) -> bool {
        matches!(self, Callback::Once(None))
    }
}
