use once_cell::sync::Lazy;
use tokio::sync::{mpsc, oneshot};

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn spawn_async<F>(fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    RUNTIME.spawn(fut);
}

/// Run `fut` on the Tokio runtime and hand its output to `on_done` on the
/// GTK main context.
pub fn run_async_to_main<T, Fut, F>(fut: Fut, on_done: F)
where
    T: Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    F: FnOnce(T) + 'static,
{
    let (tx, rx) = oneshot::channel::<T>();
    spawn_async(async move {
        let _ = tx.send(fut.await);
    });
    glib::MainContext::default().spawn_local(async move {
        match rx.await {
            Ok(value) => on_done(value),
            Err(_) => log::warn!("Background task finished without a result"),
        }
    });
}

/// Deliver every value sent on `rx` to `on_item` on the GTK main context.
pub fn attach_to_main<T, F>(mut rx: mpsc::UnboundedReceiver<T>, on_item: F)
where
    T: 'static,
    F: Fn(T) + 'static,
{
    glib::MainContext::default().spawn_local(async move {
        while let Some(item) = rx.recv().await {
            on_item(item);
        }
    });
}
