use metrics_buffer::{Instrument, MemoryPublisher, MetricBuffer, TimeUnit, Unit};
use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Debug, PartialEq, Eq)]
struct Failure(&'static str);

#[test]
fn counted_function_called_three_times_buffers_three_ones() {
    let endpoint = MemoryPublisher::new();
    let buffer = MetricBuffer::new("Test", endpoint.clone());
    let hits = buffer.count("hits").unwrap().wrap(|n: u32| n + 1);

    assert_eq!(hits(1), 2);
    assert_eq!(hits(2), 3);
    assert_eq!(hits(3), 4);

    let datums = buffer.snapshot();
    assert_eq!(datums.len(), 3);
    assert!(
        datums
            .iter()
            .all(|d| d.name == "hits" && d.as_value() == Some(1.0))
    );
    assert!(datums.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(endpoint.request_count(), 0);
}

#[test]
fn stacked_instruments_record_innermost_first() {
    let buffer = MetricBuffer::new("Test", MemoryPublisher::new());
    let api = buffer.timeit("api").unwrap();
    let requests = buffer.count("requests").unwrap();
    let handler = api.wrap(requests.wrap(|()| "ok"));

    assert_eq!(handler(()), "ok");

    let datums = buffer.snapshot();
    assert_eq!(datums.len(), 2);
    assert_eq!(datums[0].name, "requests");
    assert_eq!(datums[0].as_value(), Some(1.0));
    assert_eq!(datums[1].name, "api");
    assert_eq!(datums[1].unit, Unit::Milliseconds);
    assert!(datums[1].as_value().unwrap() >= 0.0);
}

#[test]
fn errors_pass_through_after_recording() {
    let buffer = MetricBuffer::new("Test", MemoryPublisher::new());
    let count = buffer.count("attempts").unwrap();
    let timer = buffer.timeit("attempt_time").unwrap().unit(TimeUnit::Microseconds);

    let before = buffer.len();
    let outcome: Result<(), Failure> = count.call(|| Err(Failure("upstream down")));
    assert_eq!(outcome, Err(Failure("upstream down")));
    assert_eq!(buffer.len(), before + 1);

    let outcome: Result<u8, Failure> = timer.call(|| Err(Failure("timeout")));
    assert_eq!(outcome, Err(Failure("timeout")));
    assert_eq!(buffer.len(), before + 2);
    assert_eq!(buffer.snapshot()[1].unit, Unit::Microseconds);
}

#[test]
fn panicking_function_is_recorded_once_and_keeps_panicking() {
    let buffer = MetricBuffer::new("Test", MemoryPublisher::new());
    let timer = buffer.timeit("explodes").unwrap();
    let count = buffer.count("explodes_count").unwrap();
    let wrapped = timer.wrap(count.wrap(|code: i32| -> i32 {
        panic!("failed with {code}");
    }));

    let outcome = catch_unwind(AssertUnwindSafe(|| wrapped(7)));
    let message = outcome.unwrap_err();
    assert_eq!(
        message.downcast_ref::<String>().map(String::as_str),
        Some("failed with 7")
    );

    let names: Vec<_> = buffer.snapshot().into_iter().map(|d| d.name).collect();
    assert_eq!(names, ["explodes_count", "explodes"]);
}

#[test]
fn decorated_calls_reach_the_endpoint_only_on_send() {
    let endpoint = MemoryPublisher::new();
    let buffer = MetricBuffer::new("Test", endpoint.clone());
    let work = buffer
        .count("jobs")
        .unwrap()
        .dimension("Queue", "default")
        .wrap(|x: u64| x * x);

    for i in 0..5 {
        work(i);
    }
    assert_eq!(endpoint.request_count(), 0);

    assert_eq!(buffer.send().unwrap(), 5);
    let request = &endpoint.requests()[0];
    assert_eq!(request.namespace, "Test");
    assert!(
        request
            .metric_data
            .iter()
            .all(|d| d.dimensions.get("Queue").map(String::as_str) == Some("default"))
    );
}

#[test]
fn shared_buffer_collects_from_many_threads() {
    let buffer = MetricBuffer::new("Test", MemoryPublisher::new());
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let count = buffer.count("threaded").unwrap();
                for _ in 0..25 {
                    count.call(|| ());
                }
            });
        }
    });
    assert_eq!(buffer.len(), 100);
}
