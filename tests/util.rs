#![allow(dead_code)]
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

pub fn trace_init() {
    use tracing_subscriber::filter::LevelFilter;
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .try_init();
}

/// A future that yields to the executor `yields` times before completing
/// with `value`.
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or polled"]
pub struct YieldThen<T> {
    yields: usize,
    value: Option<T>,
}

impl<T> YieldThen<T> {
    pub fn new(yields: usize, value: T) -> Self {
        Self {
            yields,
            value: Some(value),
        }
    }
}

impl<T: Unpin> Future for YieldThen<T> {
    type Output = T;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.yields == 0 {
            let value = self.value.take().expect("polled after completion");
            return Poll::Ready(value);
        }
        self.yields -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
