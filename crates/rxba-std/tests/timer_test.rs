use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rxba_core::{BaEvent, MacAddr, RxFrame, SeqNum, Tid};
use rxba_hal::{Dispatcher, RadioRx, RxIndication, TimerCallback, TimerService};
use rxba_std::{ChannelDispatcher, ChannelRadio, ManualTimer, ThreadTimer};

fn bump(hits: &Arc<AtomicUsize>) -> TimerCallback {
    let h = hits.clone();
    Box::new(move || {
        h.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_manual_timer_fires_in_deadline_order() {
    let timer = ManualTimer::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    for (delay, tag) in [(30u64, 'c'), (10, 'a'), (20, 'b')] {
        let order = order.clone();
        timer.schedule(Duration::from_millis(delay), Box::new(move || order.lock().unwrap().push(tag)));
    }
    assert_eq!(timer.advance(Duration::from_millis(15)), 1);
    assert_eq!(timer.advance(Duration::from_millis(100)), 2);
    assert_eq!(*order.lock().unwrap(), vec!['a', 'b', 'c']);
    assert_eq!(timer.now(), Duration::from_millis(115));
}

#[test]
fn test_manual_timer_cancel() {
    let timer = ManualTimer::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let handle = timer.schedule(Duration::from_millis(5), bump(&hits));
    timer.schedule(Duration::from_millis(5), bump(&hits));
    timer.cancel(handle);
    // Unknown handles are ignored.
    timer.cancel(handle);
    assert_eq!(timer.advance(Duration::from_millis(5)), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(timer.pending(), 0);
}

#[test]
fn test_manual_timer_schedule_from_callback() {
    let timer = ManualTimer::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let (t, h) = (timer.clone(), hits.clone());
    timer.schedule(
        Duration::from_millis(10),
        Box::new(move || {
            let h2 = h.clone();
            h.fetch_add(1, Ordering::SeqCst);
            t.schedule(Duration::from_millis(10), Box::new(move || {
                h2.fetch_add(1, Ordering::SeqCst);
            }));
        }),
    );
    assert_eq!(timer.fire_next(), 1);
    assert_eq!(timer.pending(), 1);
    assert_eq!(timer.advance(Duration::from_millis(10)), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_thread_timer_fires_and_cancels() {
    let timer = ThreadTimer::spawn("rxba-test-timer").unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let h = hits.clone();
    timer.schedule(Duration::from_millis(5), Box::new(move || {
        h.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    }));
    let h = hits.clone();
    let cancelled = timer.schedule(Duration::from_millis(50), Box::new(move || {
        h.fetch_add(100, Ordering::SeqCst);
    }));
    timer.cancel(cancelled);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(timer.pending(), 0);
}

#[test]
fn test_channel_dispatcher_and_radio() {
    let peer = MacAddr([2, 0, 0, 0, 0, 1]);
    let tid = Tid::new(5).unwrap();
    let (dispatcher, deliveries) = ChannelDispatcher::new();
    dispatcher.deliver(peer, tid, 7u32);
    let got = deliveries.try_recv().unwrap();
    assert_eq!((got.peer, got.tid, got.payload), (peer, tid, 7));

    let (tx, mut radio) = ChannelRadio::<u32>::new();
    assert!(matches!(radio.poll_rx(), Err(nb::Error::WouldBlock)));
    tx.send(RxIndication::Frame(RxFrame::data(peer, tid, SeqNum::new(0).unwrap(), 1))).unwrap();
    tx.send(RxIndication::Event(BaEvent::Teardown { peer, tid })).unwrap();
    let mut seen = 0;
    assert_eq!(radio.poll_batch(8, &mut |ind| {
        assert!(ind.is_ok());
        seen += 1;
    }), 2);
    assert_eq!(seen, 2);
}
