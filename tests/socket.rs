use interprocess::local_socket::{GenericFilePath, GenericNamespaced, Stream, prelude::*};
use metrics_buffer::{
    DatumOptions, IngestListener, MetricBuffer, MetricsError, PublishError, PublishRequest,
    SocketPublisherBuilder, StatisticSet, Unit,
};
use std::{
    io::{Read, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

fn unique_socket(label: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!(
        "metrics_buffer_{label}_{}_{}.sock",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

fn spawn_listener<H>(socket: &str, handler: H)
where
    H: Fn(PublishRequest) -> bool + Send + Sync + 'static,
{
    let listener = IngestListener::bind(socket).unwrap();
    thread::spawn(move || listener.serve(handler));
}

fn connect_raw(socket: &str) -> Stream {
    let name = if GenericNamespaced::is_supported() {
        socket.to_ns_name::<GenericNamespaced>().unwrap()
    } else {
        format!("/tmp/{socket}")
            .to_fs_name::<GenericFilePath>()
            .unwrap()
    };
    Stream::connect(name).unwrap()
}

#[test]
fn batches_arrive_at_the_listener_in_order() {
    let socket = unique_socket("ordered");
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    spawn_listener(&socket, move |request| {
        tx.lock().unwrap().send(request).is_ok()
    });

    let publisher = SocketPublisherBuilder::default()
        .socket(&socket)
        .batch_size(2)
        .connect()
        .unwrap();
    let buffer = MetricBuffer::new("Sidecar", publisher);
    buffer
        .put_value("a", 1.0, DatumOptions::new().unit(Unit::Count))
        .unwrap();
    buffer
        .put_value("b", 2.0, DatumOptions::new().dimension("Host", "web-1"))
        .unwrap();
    buffer
        .put_statistic(
            "c",
            StatisticSet::new(4, 10.0, 1.0, 4.0),
            DatumOptions::new(),
        )
        .unwrap();

    assert_eq!(buffer.send().unwrap(), 3);
    assert!(buffer.is_empty());

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.namespace, "Sidecar");
    let names: Vec<_> = first
        .metric_data
        .iter()
        .chain(&second.metric_data)
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, ["a", "b", "c"]);
    assert_eq!(first.metric_data[0].unit, Unit::Count);
    assert_eq!(
        first.metric_data[1].dimensions.get("Host").map(String::as_str),
        Some("web-1")
    );
    assert_eq!(
        second.metric_data[0].as_statistics(),
        Some(&StatisticSet::new(4, 10.0, 1.0, 4.0))
    );
}

#[test]
fn refused_request_surfaces_as_publish_failure() {
    let socket = unique_socket("refused");
    spawn_listener(&socket, |_| false);

    let publisher = SocketPublisherBuilder::default()
        .socket(&socket)
        .connect()
        .unwrap();
    let buffer = MetricBuffer::new("Sidecar", publisher);
    buffer.put_value("a", 1.0, DatumOptions::default()).unwrap();

    let err = buffer.send().unwrap_err();
    assert!(matches!(
        err,
        MetricsError::Publish {
            sent: 0,
            retained: 1,
            source: PublishError::Rejected(_),
            ..
        }
    ));
    assert_eq!(buffer.len(), 1);
}

#[test]
fn connecting_without_a_listener_fails() {
    let result = SocketPublisherBuilder::default()
        .socket(&unique_socket("nobody"))
        .connect();
    assert!(matches!(result, Err(MetricsError::Io(_))));
}

#[test]
fn undecodable_frame_is_refused_without_reaching_the_handler() {
    let socket = unique_socket("garbage");
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    spawn_listener(&socket, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        true
    });

    let mut stream = connect_raw(&socket);
    let payload = [0xc1, 0xc1, 0xc1];
    stream.write_all(&3u32.to_be_bytes()).unwrap();
    stream.write_all(&payload).unwrap();
    stream.flush().unwrap();

    let mut ack = [0xff];
    stream.read_exact(&mut ack).unwrap();
    assert_eq!(ack, [0]);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}
