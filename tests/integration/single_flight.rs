//! Concurrency, failure isolation, and TTL behaviour of the single-flight cache.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use stable_presign::{CacheStatus, Error, Producer, SingleFlight};
use tokio::{sync::Barrier, task::JoinSet, time};

/// Producer that takes one second and then yields the outcome scripted for its call index.
fn scripted(
	calls: Arc<AtomicUsize>,
	script: fn(usize) -> Result<&'static str, &'static str>,
) -> impl Producer<Output = &'static str> {
	move || {
		let calls = calls.clone();

		async move {
			let call = calls.fetch_add(1, Ordering::SeqCst);

			time::sleep(Duration::from_secs(1)).await;

			script(call).map_err(|reason| Error::Signing(reason.to_owned()))
		}
	}
}

#[tokio::test(start_paused = true)]
async fn concurrent_stale_callers_share_one_invocation() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = Arc::new(SingleFlight::new(
		"shared",
		Duration::from_secs(15),
		scripted(calls.clone(), |_| Ok("k1")),
	));
	let mut tasks = JoinSet::new();

	for _ in 0..16 {
		let cache = cache.clone();

		tasks.spawn(async move { cache.get().await });
	}

	for result in tasks.join_all().await {
		assert_eq!(result.unwrap(), "k1");
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let metrics = cache.metrics().snapshot();

	assert_eq!(metrics.refresh_successes, 1);
	assert_eq!(metrics.coalesced, 15);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_failure() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = Arc::new(SingleFlight::new(
		"failing",
		Duration::from_secs(15),
		scripted(calls.clone(), |_| Err("access denied")),
	));
	let mut tasks = JoinSet::new();

	for _ in 0..8 {
		let cache = cache.clone();

		tasks.spawn(async move { cache.get().await });
	}

	for result in tasks.join_all().await {
		let err = result.unwrap_err();

		assert!(matches!(err, Error::Producer { attempt: 1, .. }));
		assert!(matches!(err.root(), Error::Signing(reason) if reason == "access denied"));
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_leaves_stale_value_and_next_call_retries() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = SingleFlight::new(
		"flaky",
		Duration::from_secs(15),
		scripted(calls.clone(), |call| match call {
			0 => Ok("k1"),
			1 => Err("throttled"),
			_ => Ok("k2"),
		}),
	);

	assert_eq!(cache.get().await.unwrap(), "k1");

	let refreshed_at = cache.snapshot().await.refreshed_at;

	time::advance(Duration::from_secs(20)).await;

	assert!(cache.get().await.is_err());

	let snapshot = cache.snapshot().await;

	assert_eq!(snapshot.status, CacheStatus::Stale);
	assert_eq!(snapshot.refreshed_at, refreshed_at);
	assert_eq!(snapshot.consecutive_failures, 1);
	assert_eq!(cache.get().await.unwrap(), "k2");
	assert_eq!(calls.load(Ordering::SeqCst), 3);
	assert_eq!(cache.snapshot().await.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn failure_on_empty_cache_does_not_block_later_attempts() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = SingleFlight::new(
		"cold",
		Duration::from_secs(15),
		scripted(calls.clone(), |call| if call == 0 { Err("not found") } else { Ok("k1") }),
	);

	assert!(cache.get().await.is_err());
	assert_eq!(cache.snapshot().await.status, CacheStatus::Empty);
	assert_eq!(cache.get().await.unwrap(), "k1");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn callers_queued_behind_an_attempt_observe_its_value() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = Arc::new(SingleFlight::new(
		"ordered",
		Duration::from_millis(500),
		scripted(calls.clone(), |call| Ok(if call == 0 { "first" } else { "later" })),
	));
	let first = tokio::spawn({
		let cache = cache.clone();

		async move { cache.get().await }
	});

	// Let the first caller start its attempt before the second one queues.
	tokio::task::yield_now().await;

	let second = tokio::spawn({
		let cache = cache.clone();

		async move { cache.get().await }
	});

	assert_eq!(first.await.unwrap().unwrap(), "first");
	assert_eq!(second.await.unwrap().unwrap(), "first");
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn value_is_refreshed_once_ttl_has_elapsed() {
	let calls = Arc::new(AtomicUsize::new(0));
	let producer = {
		let calls = calls.clone();

		move || {
			let call = calls.fetch_add(1, Ordering::SeqCst);

			async move { Ok::<_, Error>(if call == 0 { "k1" } else { "k2" }) }
		}
	};
	let cache = SingleFlight::new("scenario", Duration::from_millis(15_000), producer);

	assert_eq!(cache.get().await.unwrap(), "k1");

	time::advance(Duration::from_millis(10_000)).await;

	assert_eq!(cache.get().await.unwrap(), "k1");

	time::advance(Duration::from_millis(6_000)).await;

	assert_eq!(cache.get().await.unwrap(), "k2");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_does_not_wedge_the_queue() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = Arc::new(SingleFlight::new(
		"cancelled",
		Duration::from_secs(15),
		scripted(calls.clone(), |_| Ok("k1")),
	));
	let abandoned = tokio::spawn({
		let cache = cache.clone();

		async move { cache.get().await }
	});

	tokio::task::yield_now().await;
	abandoned.abort();

	assert!(abandoned.await.unwrap_err().is_cancelled());
	assert_eq!(cache.get().await.unwrap(), "k1");
	assert_eq!(cache.snapshot().await.status, CacheStatus::Fresh);
}

/// Release `callers` tasks at once against `cache` and collect what each of them got.
async fn stampede<P>(cache: &Arc<SingleFlight<P>>, callers: usize) -> Vec<usize>
where
	P: 'static + Producer<Output = usize>,
{
	let barrier = Arc::new(Barrier::new(callers));
	let mut tasks = JoinSet::new();

	for _ in 0..callers {
		let cache = cache.clone();
		let barrier = barrier.clone();

		tasks.spawn(async move {
			barrier.wait().await;

			cache.get().await
		});
	}

	tasks.join_all().await.into_iter().map(|result| result.unwrap()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn worker_threads_never_double_produce() {
	const CALLERS: usize = 64;

	for round in 0..25 {
		let calls = Arc::new(AtomicUsize::new(0));
		let producer = {
			let calls = calls.clone();

			move || {
				let calls = calls.clone();

				async move {
					let call = calls.fetch_add(1, Ordering::SeqCst);

					time::sleep(Duration::from_millis(5)).await;

					Ok::<_, Error>(call)
				}
			}
		};
		let cache = Arc::new(SingleFlight::new("threads", Duration::from_millis(100), producer));

		assert!(stampede(&cache, CALLERS).await.iter().all(|value| *value == 0), "round {round}");
		assert_eq!(calls.load(Ordering::SeqCst), 1, "round {round}");

		time::sleep(Duration::from_millis(110)).await;

		assert_eq!(cache.snapshot().await.status, CacheStatus::Stale);
		assert!(stampede(&cache, CALLERS).await.iter().all(|value| *value == 1), "round {round}");
		assert_eq!(calls.load(Ordering::SeqCst), 2, "round {round}");
	}
}
