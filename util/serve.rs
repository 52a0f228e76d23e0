use backtrace::Backtrace;
use futures::FutureExt;
use hyper::{Body, Request, Response, StatusCode};
use std::{
	cell::RefCell, convert::Infallible, future::Future, net::SocketAddr, panic::AssertUnwindSafe,
	sync::Arc, time::Instant,
};

type PanicHook = dyn Fn(&std::panic::PanicInfo<'_>) + Send + Sync + 'static;

tokio::task_local! {
	static PANIC_MESSAGE_AND_BACKTRACE: RefCell<Option<(String, Backtrace)>>;
}

/**
Serve `request_handler` on `host:port` until `shutdown` resolves.

Every request is logged with its method, path, status and latency. If the handler panics, the panic message and backtrace are logged and the client receives a bare 500 response.
*/
pub async fn serve<C, H, F, S>(
	host: std::net::IpAddr,
	port: u16,
	request_handler_context: C,
	request_handler: H,
	shutdown: S,
) -> hyper::Result<()>
where
	C: Send + Sync + 'static,
	H: Fn(Arc<C>, Request<Body>) -> F + Send + Sync + 'static,
	F: Future<Output = Response<Body>> + Send,
	S: Future<Output = ()>,
{
	async fn service<C, H, F>(
		request_handler: Arc<H>,
		request_handler_context: Arc<C>,
		request: Request<Body>,
	) -> Result<Response<Body>, Infallible>
	where
		C: Send + Sync + 'static,
		H: Fn(Arc<C>, Request<Body>) -> F + Send + Sync + 'static,
		F: Future<Output = Response<Body>> + Send,
	{
		let start = Instant::now();
		let method = request.method().clone();
		let path = request.uri().path().to_owned();
		let result = AssertUnwindSafe(request_handler(request_handler_context, request))
			.catch_unwind()
			.await;
		let response = result.unwrap_or_else(|_| {
			let panic_message_and_backtrace = PANIC_MESSAGE_AND_BACKTRACE
				.try_with(|panic_message_and_backtrace| panic_message_and_backtrace.borrow_mut().take())
				.ok()
				.flatten();
			if let Some((message, backtrace)) = panic_message_and_backtrace {
				tracing::error!(%method, %path, "{}\n{:?}", message, backtrace);
			}
			let mut response = Response::new(Body::from("internal server error"));
			*response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
			response
		});
		tracing::info!(
			%method,
			%path,
			status = response.status().as_u16(),
			latency_ms = start.elapsed().as_secs_f64() * 1000.0,
			"request",
		);
		Ok(response)
	}
	// Record the panic message and backtrace in the task local when a panic occurs inside a request, and defer to the previous hook everywhere else.
	let hook: Arc<PanicHook> = Arc::from(std::panic::take_hook());
	let previous_hook = hook.clone();
	std::panic::set_hook(Box::new(move |panic_info| {
		let value = (panic_info.to_string(), Backtrace::new());
		let recorded = PANIC_MESSAGE_AND_BACKTRACE.try_with(|panic_message_and_backtrace| {
			panic_message_and_backtrace.borrow_mut().replace(value);
		});
		if recorded.is_err() {
			previous_hook(panic_info);
		}
	}));
	let request_handler = Arc::new(request_handler);
	let request_handler_context = Arc::new(request_handler_context);
	let service = hyper::service::make_service_fn(|_| {
		let request_handler = request_handler.clone();
		let request_handler_context = request_handler_context.clone();
		async move {
			Ok::<_, Infallible>(hyper::service::service_fn(move |request| {
				let request_handler = request_handler.clone();
				let request_handler_context = request_handler_context.clone();
				PANIC_MESSAGE_AND_BACKTRACE.scope(RefCell::new(None), async move {
					service(request_handler, request_handler_context, request).await
				})
			}))
		}
	});
	let addr = SocketAddr::new(host, port);
	let server = hyper::Server::try_bind(&addr)?;
	tracing::info!(%addr, "serving");
	let result = server.serve(service).with_graceful_shutdown(shutdown).await;
	std::panic::set_hook(Box::new(move |panic_info| hook(panic_info)));
	tracing::info!("server stopped");
	result
}
