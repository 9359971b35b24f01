mod common;

use std::time::Duration;

use common::*;
use rxba_core::{BaEvent, MacAddr, RxFrame, RxbaError};
use rxba_hal::RxIndication;
use rxba_reorder::{Bypass, EngineConfig, FlushPolicy, RxVerdict};

#[test]
fn test_in_order_and_gap_fill() {
    let h = Harness::new();
    let t = tid(0);
    h.engine.create_or_reset(PEER, t, ws(4), seq(10)).unwrap();
    h.engine.establish(PEER, t, true).unwrap();

    assert_eq!(h.data(t, 10), RxVerdict::Released);
    assert_eq!(h.data(t, 11), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![10, 11]);

    assert_eq!(h.data(t, 13), RxVerdict::Buffered);
    assert_eq!(h.delivered(), vec![10, 11]);
    assert_eq!(h.data(t, 12), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![10, 11, 12, 13]);

    let info = h.engine.session_info(PEER, t).unwrap();
    assert_eq!(info.start_win, seq(14));
    assert_eq!(info.buffered, 0);
}

#[test]
fn test_duplicate_dispatched_once() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    assert_eq!(h.data(t, 10), RxVerdict::Dropped(RxbaError::Duplicate));
    assert_eq!(h.data(t, 12), RxVerdict::Buffered);
    assert_eq!(h.data(t, 12), RxVerdict::Dropped(RxbaError::Duplicate));
    assert_eq!(h.delivered(), vec![10]);
    assert_eq!(h.engine.stats().dropped_duplicate, 2);
}

#[test]
fn test_window_advance_flushes_stale_slots() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    assert_eq!(h.data(t, 13), RxVerdict::Buffered);

    assert_eq!(h.data(t, 20), RxVerdict::Buffered);
    assert_eq!(h.delivered(), vec![10, 13]);
    let info = h.engine.session_info(PEER, t).unwrap();
    assert_eq!(info.start_win, seq(17));
    assert_eq!(info.buffered, 1);
    assert_eq!(h.engine.stats().window_advances, 1);

    // 17..19 never show up; the gap closes on the next slide.
    assert_eq!(h.data(t, 24), RxVerdict::Buffered);
    assert_eq!(h.delivered(), vec![10, 13, 20]);
}

#[test]
fn test_flush_timer_skips_holes() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 12);
    h.data(t, 14);
    assert!(h.engine.session_info(PEER, t).unwrap().timer_armed);

    assert_eq!(h.timer.advance(Duration::from_millis(199)), 0);
    assert_eq!(h.delivered(), vec![10]);
    assert_eq!(h.timer.advance(Duration::from_millis(1)), 1);
    assert_eq!(h.delivered(), vec![10, 12, 14]);

    let info = h.engine.session_info(PEER, t).unwrap();
    assert_eq!(info.start_win, seq(15));
    assert!(!info.timer_armed);
    assert_eq!(h.engine.stats().timer_flushes, 1);
}

#[test]
fn test_flush_timer_contiguous_only_waits_for_head() {
    let config = EngineConfig { flush_policy: FlushPolicy::ContiguousOnly, ..EngineConfig::default() };
    let h = Harness::with_config(config);
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 12);
    h.data(t, 14);

    h.timer.advance(Duration::from_secs(1));
    assert_eq!(h.delivered(), vec![10]);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(11));

    assert_eq!(h.data(t, 11), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![10, 11, 12]);
}

#[test]
fn test_flush_delay_scales_with_window() {
    let h = Harness::new();
    h.open(tid(1), 8, 0);
    assert_eq!(h.timer.next_deadline(), Some(Duration::from_millis(400)));
}

#[test]
fn test_teardown_releases_and_stops_timer() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 12);
    h.data(t, 14);

    assert!(h.engine.teardown(PEER, t));
    assert_eq!(h.delivered(), vec![10, 12, 14]);
    assert_eq!(h.engine.session_count(), 0);
    assert_eq!(h.timer.pending(), 0);
    assert_eq!(h.timer.advance(Duration::from_secs(1)), 0);

    assert!(!h.engine.teardown(PEER, t));
    assert_eq!(h.delivered(), vec![10, 12, 14]);
}

#[test]
fn test_timer_fire_after_teardown_is_noop() {
    let h = Harness::uncancellable();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 12);
    h.engine.teardown(PEER, t);
    assert_eq!(h.timer.pending(), 1);

    assert_eq!(h.timer.advance(Duration::from_secs(1)), 1);
    assert_eq!(h.delivered(), vec![10, 12]);
    assert_eq!(h.engine.stats().timer_flushes, 0);
}

#[test]
fn test_stale_timer_ignored_after_restart() {
    let h = Harness::uncancellable();
    let t = tid(0);
    h.open(t, 4, 10);
    h.timer.advance(Duration::from_millis(100));

    // start_win moves, so the timer is re-armed for t=300ms.
    assert_eq!(h.data(t, 11), RxVerdict::Released);
    assert_eq!(h.data(t, 13), RxVerdict::Buffered);

    assert_eq!(h.timer.advance(Duration::from_millis(100)), 1);
    assert_eq!(h.delivered(), vec![10, 11]);
    assert_eq!(h.timer.advance(Duration::from_millis(100)), 1);
    assert_eq!(h.delivered(), vec![10, 11, 13]);
}

#[test]
fn test_sequence_wraparound() {
    let h = Harness::new();
    let t = tid(2);
    h.open(t, 8, 4094);
    assert_eq!(h.data(t, 4095), RxVerdict::Released);
    assert_eq!(h.data(t, 1), RxVerdict::Buffered);
    assert_eq!(h.data(t, 0), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![4094, 4095, 0, 1]);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(2));
}

#[test]
fn test_out_of_window_dropped() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    assert_eq!(h.data(t, 2059), RxVerdict::Dropped(RxbaError::OutOfWindow));
    assert_eq!(h.data(t, 3000), RxVerdict::Dropped(RxbaError::OutOfWindow));
    assert_eq!(h.delivered(), vec![10]);
    assert_eq!(h.engine.stats().dropped_out_of_window, 2);
}

#[test]
fn test_force_no_drop_is_one_shot() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 13);
    assert_eq!(h.engine.set_force_no_drop(PEER, Some(t), true), 1);
    assert!(h.engine.session_info(PEER, t).unwrap().force_no_drop);

    assert_eq!(h.data(t, 2059), RxVerdict::Buffered);
    assert_eq!(h.delivered(), vec![10, 13]);
    let info = h.engine.session_info(PEER, t).unwrap();
    assert!(!info.force_no_drop);
    assert_eq!(info.start_win, seq(2056));

    assert_eq!(h.data(t, 2000), RxVerdict::Dropped(RxbaError::OutOfWindow));
}

#[test]
fn test_force_no_drop_all_sessions() {
    let h = Harness::new();
    h.open(tid(0), 4, 0);
    h.open(tid(1), 4, 0);
    h.engine.create_or_reset(OTHER_PEER, tid(0), ws(4), seq(0)).unwrap();
    assert_eq!(h.engine.set_force_no_drop(PEER, None, true), 2);
    assert_eq!(h.engine.set_force_no_drop_all(true), 3);
    assert!(h.engine.session_info(OTHER_PEER, tid(0)).unwrap().force_no_drop);
}

#[test]
fn test_block_ack_request_moves_window() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 13);
    h.data(t, 14);

    assert_eq!(h.engine.admit(RxFrame::bar(PEER, t, seq(14))), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![10, 13, 14]);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(15));

    // SSN at start_win leaves the window where it is.
    assert_eq!(h.engine.admit(RxFrame::bar(PEER, t, seq(15))), RxVerdict::Released);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(15));
}

#[test]
fn test_bar_without_session_dropped() {
    let h = Harness::new();
    let verdict = h.engine.admit(RxFrame::bar(PEER, tid(0), seq(5)));
    assert_eq!(verdict, RxVerdict::Dropped(RxbaError::UnknownSession));
    assert_eq!(h.engine.stats().dropped_no_session, 1);
    assert!(h.delivered().is_empty());
}

#[test]
fn test_no_session_forwards_directly() {
    let h = Harness::new();
    assert_eq!(h.data(tid(4), 7), RxVerdict::Forwarded(Bypass::NoSession));
    assert_eq!(h.data(tid(4), 3), RxVerdict::Forwarded(Bypass::NoSession));
    assert_eq!(h.delivered(), vec![7, 3]);
}

#[test]
fn test_amsdu_bypasses_window_unless_allowed() {
    let h = Harness::new();
    let t = tid(0);
    h.engine.create_or_reset(PEER, t, ws(4), seq(10)).unwrap();
    h.engine.establish(PEER, t, false).unwrap();

    let verdict = h.engine.admit(RxFrame::amsdu(PEER, t, seq(12), 12));
    assert_eq!(verdict, RxVerdict::Forwarded(Bypass::AmsduNotAllowed));
    assert!(h.engine.session_info(PEER, t).unwrap().warming_up);

    h.engine.establish(PEER, t, true).unwrap();
    assert_eq!(h.engine.admit(RxFrame::amsdu(PEER, t, seq(10), 10)), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![12, 10]);
}

#[test]
fn test_warm_up_realigns_to_trailing_peer() {
    let h = Harness::new();
    let t = tid(0);
    assert_eq!(h.data(t, 49), RxVerdict::Forwarded(Bypass::NoSession));
    h.engine.create_or_reset(PEER, t, ws(8), seq(100)).unwrap();
    assert_eq!(h.engine.session_info(PEER, t).unwrap().last_seq, Some(seq(49)));

    for n in 50..53 {
        assert_eq!(h.data(t, n), RxVerdict::Forwarded(Bypass::WarmUp));
    }
    assert_eq!(h.data(t, 53), RxVerdict::Released);
    assert_eq!(h.data(t, 54), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![49, 50, 51, 52, 53, 54]);

    let info = h.engine.session_info(PEER, t).unwrap();
    assert!(!info.warming_up);
    assert_eq!(info.start_win, seq(55));
    let stats = h.engine.stats();
    assert_eq!(stats.forwarded_warmup, 3);
    assert_eq!(stats.realignments, 1);
}

#[test]
fn test_no_session_history_keeps_latest_sender_per_tid() {
    let h = Harness::new();
    let t = tid(2);
    h.data(t, 49);
    for i in 0..1000u16 {
        let peer = MacAddr([0x02, 0, 0, 0, (i >> 8) as u8, i as u8]);
        h.engine.admit(RxFrame::data(peer, t, seq(i), 0));
    }
    h.engine.admit(RxFrame::data(OTHER_PEER, t, seq(700), 0));
    h.data(tid(3), 90);

    h.engine.create_or_reset(PEER, t, ws(8), seq(0)).unwrap();
    assert_eq!(h.engine.session_info(PEER, t).unwrap().last_seq, None);
    h.engine.create_or_reset(OTHER_PEER, t, ws(8), seq(0)).unwrap();
    assert_eq!(h.engine.session_info(OTHER_PEER, t).unwrap().last_seq, Some(seq(700)));
    h.engine.create_or_reset(PEER, tid(3), ws(8), seq(0)).unwrap();
    assert_eq!(h.engine.session_info(PEER, tid(3)).unwrap().last_seq, Some(seq(90)));
}

#[test]
fn test_teardown_peer_forgets_no_session_history() {
    let h = Harness::new();
    let t = tid(1);
    h.data(t, 300);
    h.engine.teardown_peer(PEER);
    h.engine.create_or_reset(PEER, t, ws(8), seq(0)).unwrap();
    assert_eq!(h.engine.session_info(PEER, t).unwrap().last_seq, None);
}

#[test]
fn test_warm_up_realigns_when_last_seq_inside_window() {
    let h = Harness::new();
    let t = tid(0);
    h.data(t, 101);
    h.engine.create_or_reset(PEER, t, ws(8), seq(100)).unwrap();
    for n in 104..107 {
        assert_eq!(h.data(t, n), RxVerdict::Forwarded(Bypass::WarmUp));
    }
    assert_eq!(h.data(t, 107), RxVerdict::Released);
    assert_eq!(h.delivered(), vec![101, 104, 105, 106, 107]);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(108));
}

#[test]
fn test_warm_up_without_realignment() {
    let h = Harness::new();
    let t = tid(0);
    h.engine.create_or_reset(PEER, t, ws(4), seq(100)).unwrap();
    assert_eq!(h.data(t, 50), RxVerdict::Forwarded(Bypass::WarmUp));
    assert_eq!(h.data(t, 150), RxVerdict::Buffered);
    let info = h.engine.session_info(PEER, t).unwrap();
    assert_eq!(info.start_win, seq(147));
    assert_eq!(h.engine.stats().realignments, 0);
}

#[test]
fn test_warm_up_drops_repeat_of_last_seq() {
    let h = Harness::new();
    let t = tid(0);
    h.engine.create_or_reset(PEER, t, ws(8), seq(100)).unwrap();
    assert_eq!(h.data(t, 50), RxVerdict::Forwarded(Bypass::WarmUp));
    assert_eq!(h.data(t, 50), RxVerdict::Dropped(RxbaError::Duplicate));
    assert_eq!(h.delivered(), vec![50]);
}

#[test]
fn test_peer_dropped_frames_fill_holes() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);
    h.data(t, 13);

    assert_eq!(h.engine.peer_dropped_frames(PEER, t, seq(11), &[0b0000_0011]), Ok(2));
    assert_eq!(h.delivered(), vec![10, 13]);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(14));
    assert_eq!(h.engine.stats().fw_dropped, 2);
}

#[test]
fn test_peer_dropped_frames_rejects_bad_events() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);

    let empty = BaEvent::PeerDroppedFrames { peer: PEER, tid: t, base_seq: seq(11), bitmap: vec![] };
    assert_eq!(h.engine.handle_event(empty), Err(RxbaError::MalformedEvent));
    let oversized = BaEvent::PeerDroppedFrames { peer: PEER, tid: t, base_seq: seq(11), bitmap: vec![0xff; 9] };
    assert_eq!(h.engine.handle_event(oversized), Err(RxbaError::MalformedEvent));
    let unknown = BaEvent::PeerDroppedFrames { peer: PEER, tid: tid(9), base_seq: seq(11), bitmap: vec![1] };
    assert_eq!(h.engine.handle_event(unknown), Err(RxbaError::UnknownSession));

    assert_eq!(h.engine.stats().malformed_events, 2);
    assert_eq!(h.engine.session_info(PEER, t).unwrap().start_win, seq(11));
}

#[test]
fn test_indication_path_absorbs_bad_events() {
    let h = Harness::new();
    let t = tid(0);
    h.open(t, 4, 10);

    let bad = BaEvent::PeerDroppedFrames { peer: PEER, tid: t, base_seq: seq(11), bitmap: vec![] };
    h.engine.handle_indication(RxIndication::Event(bad));
    h.engine.handle_indication(RxIndication::Frame(RxFrame::data(PEER, t, seq(11), 11)));

    assert_eq!(h.engine.stats().malformed_events, 1);
    assert_eq!(h.delivered(), vec![10, 11]);
}
