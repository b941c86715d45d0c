mod callback;
mod combine;
mod event;
mod exec;
mod future;
mod promise;
mod result;
mod state;
mod task;
mod timer;

pub use callback::Callback;
pub use combine::{all, any, race};
pub use exec::{EventLoop, Executor, ExecutorRef, LoopStatus, Priority, Remote};
pub use future::PromiseFuture;
pub use promise::{Promise, Resolver};
pub use result::Outcome;
pub use state::Status;
pub use task::spawn;
pub use timer::TimerHandle;
