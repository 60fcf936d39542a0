// Integration tests for signals, connections and signal waits

use spindle_host::task::from_fn;
use spindle_host::{
    Args, Callback, Environment, ScriptError, SchedulerError, SignalId, TaskStatus, Value,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Calls = Rc<RefCell<Vec<Args>>>;

fn new_calls() -> Calls {
    Rc::new(RefCell::new(Vec::new()))
}

/// Listener that records the args of every invocation
fn recording(calls: &Calls) -> Callback {
    let calls = Rc::clone(calls);
    Callback::from_fn(move |_cx, args| {
        calls.borrow_mut().push(args);
        Ok(TaskStatus::Finished)
    })
}

/// Spawn a task that waits on `signal` once and records what it resumes with
fn spawn_waiter(env: &mut Environment, signal: SignalId, calls: &Calls) {
    let calls = Rc::clone(calls);
    let mut waiting = false;
    env.spawn(
        "waiter",
        from_fn(move |cx, args| {
            if !waiting {
                waiting = true;
                return cx.wait(signal);
            }
            calls.borrow_mut().push(args);
            Ok(TaskStatus::Finished)
        }),
        Vec::new(),
    )
    .expect("waiter should start");
}

fn args123() -> Args {
    vec![Value::from(1), Value::from(2), Value::from(3)]
}

#[test]
fn test_fire_without_listeners_or_waiters_is_noop() {
    let mut env = Environment::new();
    let signal = env.create_signal();

    assert!(env.fire(signal, &[]).is_ok());
    assert!(env.fire(signal, &[Value::from("x")]).is_ok());
    assert_eq!(env.stats().failures, 0);
}

#[test]
fn test_connected_listener_runs_on_every_fire() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    env.connect(signal, recording(&calls)).unwrap();

    env.fire(signal, &args123()).unwrap();
    env.fire(signal, &args123()).unwrap();

    assert_eq!(*calls.borrow(), vec![args123(), args123()]);
}

#[test]
fn test_once_listener_runs_exactly_once() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let conn = env.once(signal, recording(&calls)).unwrap();
    assert!(env.connected(conn));

    env.fire(signal, &[Value::from("first")]).unwrap();
    assert!(!env.connected(conn));

    env.fire(signal, &[Value::from("second")]).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from("first")]]);
}

#[test]
fn test_once_listener_is_disconnected_before_its_callback_runs() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let recorder = Rc::clone(&calls);

    // Re-fires the signal from inside its own callback
    let callback = Callback::from_fn(move |cx, args| {
        recorder.borrow_mut().push(args.clone());
        if args.is_empty() {
            cx.fire(signal, &[Value::from("nested")])?;
        }
        Ok(TaskStatus::Finished)
    });
    env.once(signal, callback).unwrap();

    env.fire(signal, &[]).unwrap();
    assert_eq!(calls.borrow().len(), 1, "nested fire must not reach the once listener");
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let conn = env.connect(signal, recording(&calls)).unwrap();

    env.disconnect(conn);
    assert!(!env.connected(conn));
    env.disconnect(conn);
    assert!(!env.connected(conn));

    env.fire(signal, &[]).unwrap();
    assert!(calls.borrow().is_empty());
    assert_eq!(env.listener_count(signal), 0);
}

#[test]
fn test_waiter_resumes_with_fire_args_only_once() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    spawn_waiter(&mut env, signal, &calls);
    assert_eq!(env.waiting_on(signal), 1);

    env.fire(signal, &[Value::from("x")]).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from("x")]]);

    env.fire(signal, &[Value::from("y")]).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(env.waiting_on(signal), 0);
}

#[test]
fn test_failing_listener_does_not_block_the_next_one() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();

    env.connect(
        signal,
        Callback::from_fn(|_cx, _args| Err(ScriptError::runtime("listener failed"))),
    )
    .unwrap();
    env.connect(
        signal,
        Callback::from_fn(|_cx, _args| -> Result<TaskStatus, ScriptError> {
            panic!("listener panicked")
        }),
    )
    .unwrap();
    env.connect(signal, recording(&calls)).unwrap();
    spawn_waiter(&mut env, signal, &calls);

    env.fire(signal, &args123()).unwrap();

    // The recording listener and the waiter both got the args
    assert_eq!(*calls.borrow(), vec![args123(), args123()]);
    assert_eq!(env.stats().failures, 2);
}

#[test]
fn test_listeners_run_before_waiters_in_registration_order() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let order = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = Rc::clone(&order);
        env.connect(
            signal,
            Callback::from_fn(move |_cx, _args| {
                order.borrow_mut().push(name);
                Ok(TaskStatus::Finished)
            }),
        )
        .unwrap();
    }

    let waiter_order = Rc::clone(&order);
    let mut waiting = false;
    env.spawn(
        "waiter",
        from_fn(move |cx, _args| {
            if !waiting {
                waiting = true;
                return cx.wait(signal);
            }
            waiter_order.borrow_mut().push("waiter");
            Ok(TaskStatus::Finished)
        }),
        Vec::new(),
    )
    .unwrap();

    env.fire(signal, &[]).unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second", "third", "waiter"]);
}

#[test]
fn test_listener_disconnected_mid_fire_still_runs_this_fire() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let victim: Rc<RefCell<Option<spindle_host::Connection>>> = Rc::new(RefCell::new(None));
    let target = Rc::clone(&victim);

    env.connect(
        signal,
        Callback::from_fn(move |cx, _args| {
            if let Some(conn) = *target.borrow() {
                cx.env().disconnect(conn);
            }
            Ok(TaskStatus::Finished)
        }),
    )
    .unwrap();
    let conn = env.connect(signal, recording(&calls)).unwrap();
    *victim.borrow_mut() = Some(conn);

    env.fire(signal, &[Value::from(1)]).unwrap();
    assert_eq!(calls.borrow().len(), 1, "snapshot listener still invoked");
    assert!(!env.connected(conn));

    env.fire(signal, &[Value::from(2)]).unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn test_listener_connected_mid_fire_waits_for_next_fire() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let late = recording(&calls);

    env.once(
        signal,
        Callback::from_fn(move |cx, _args| {
            cx.env().connect(signal, late.clone())?;
            Ok(TaskStatus::Finished)
        }),
    )
    .unwrap();

    env.fire(signal, &[Value::from("a")]).unwrap();
    assert!(calls.borrow().is_empty());

    env.fire(signal, &[Value::from("b")]).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from("b")]]);
}

#[test]
fn test_suspending_listener_does_not_block_siblings() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let resumed = Rc::new(RefCell::new(0));
    let resumed_in_listener = Rc::clone(&resumed);

    // Each invocation gets its own task, so the captured step counter is per call
    env.connect(
        signal,
        Callback::new(move || {
            let resumed = Rc::clone(&resumed_in_listener);
            let mut delayed = false;
            from_fn(move |cx, _args| {
                if !delayed {
                    delayed = true;
                    return cx.delay(0.5);
                }
                *resumed.borrow_mut() += 1;
                Ok(TaskStatus::Finished)
            })
        }),
    )
    .unwrap();
    env.connect(signal, recording(&calls)).unwrap();

    env.fire(signal, &[]).unwrap();
    env.fire(signal, &[]).unwrap();
    assert_eq!(calls.borrow().len(), 2);
    assert_eq!(env.pending_delays(), 2);

    env.update(0.5);
    assert_eq!(*resumed.borrow(), 2);
}

#[test]
fn test_waiter_that_waits_again_needs_another_fire() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let recorder = Rc::clone(&calls);

    let task = env.create_task(
        "loop_waiter",
        from_fn(move |cx, args| {
            recorder.borrow_mut().push(args);
            // The new wait must not be satisfied by the fire being delivered
            cx.wait(signal)
        }),
    );
    env.wait(&task, signal).unwrap();

    env.fire(signal, &[Value::from(1)]).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(env.waiting_on(signal), 1);

    env.fire(signal, &[Value::from(2)]).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from(1)], vec![Value::from(2)]]);
}

#[test]
fn test_destroy_keeps_waiters_parked() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let calls = new_calls();
    let conn = env.connect(signal, recording(&calls)).unwrap();
    spawn_waiter(&mut env, signal, &calls);

    assert_eq!(env.destroy_signal(signal), 1);
    assert_eq!(env.signal_count(), 0);
    assert!(!env.connected(conn));
    assert_eq!(env.total_parked(), 1, "waiter is stranded, not resumed");
    assert!(calls.borrow().is_empty());

    // Destroying twice is harmless
    assert_eq!(env.destroy_signal(signal), 0);
}

#[test]
fn test_destroyed_signal_rejects_new_use() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    env.destroy_signal(signal);

    let calls = new_calls();
    assert_eq!(
        env.connect(signal, recording(&calls)).unwrap_err(),
        SchedulerError::UnknownSignal(signal)
    );
    assert_eq!(
        env.once(signal, recording(&calls)).unwrap_err(),
        SchedulerError::UnknownSignal(signal)
    );
    assert_eq!(env.fire(signal, &[]), Err(SchedulerError::UnknownSignal(signal)));

    let task = env.create_task("t", from_fn(|_cx, _args| Ok(TaskStatus::Finished)));
    assert_eq!(env.wait(&task, signal), Err(SchedulerError::UnknownSignal(signal)));
}

#[test]
fn test_wait_on_destroyed_signal_fails_inside_task() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    env.destroy_signal(signal);

    let result = env.spawn("late", from_fn(move |cx, _args| cx.wait(signal)), Vec::new());
    assert!(matches!(
        result,
        Err(ScriptError::InvalidArgument { function: "signal", .. })
    ));
}

#[test]
fn test_named_signals_are_found_by_name() {
    let mut env = Environment::new();
    let signal = env.create_named_signal("event");
    assert_eq!(env.find_signal("event"), Some(signal));
    assert_eq!(env.find_signal("other"), None);

    env.destroy_signal(signal);
    assert_eq!(env.find_signal("event"), None);
}

#[test]
fn test_signals_relay_between_tasks() {
    let mut env = Environment::new();
    let ping = env.create_signal();
    let pong = env.create_signal();
    let calls = new_calls();

    // Answers every ping with a pong carrying the same args plus a marker
    env.connect(
        ping,
        Callback::from_fn(move |cx, mut args| {
            args.push(Value::from("pong"));
            cx.fire(pong, &args)?;
            Ok(TaskStatus::Finished)
        }),
    )
    .unwrap();
    spawn_waiter(&mut env, pong, &calls);

    env.fire(ping, &[Value::from(7)]).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from(7), Value::from("pong")]]);
    assert_eq!(env.stats().fires, 2);
}

/// Listener that fires `signal` again from inside the first fire it sees
fn refire_once(signal: SignalId, calls: &Rc<Cell<u32>>) -> Callback {
    let calls = Rc::clone(calls);
    Callback::from_fn(move |cx, _args| {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            cx.fire(signal, &[Value::from("inner")])?;
        }
        Ok(TaskStatus::Finished)
    })
}

#[test]
fn test_once_listener_consumed_by_nested_fire_is_skipped_by_outer_fire() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let refires = Rc::new(Cell::new(0));
    let once_calls = new_calls();

    env.connect(signal, refire_once(signal, &refires)).unwrap();
    let conn = env.once(signal, recording(&once_calls)).unwrap();

    env.fire(signal, &[Value::from("outer")]).unwrap();
    assert_eq!(refires.get(), 2);
    assert_eq!(*once_calls.borrow(), vec![vec![Value::from("inner")]]);
    assert!(!env.connected(conn));

    env.fire(signal, &[Value::from("later")]).unwrap();
    assert_eq!(once_calls.borrow().len(), 1);
    assert_eq!(env.stats().failures, 0);
}

#[test]
fn test_nested_fire_from_persistent_listener() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let refires = Rc::new(Cell::new(0));
    let listener_calls = new_calls();
    let waiter_calls = new_calls();

    env.connect(signal, refire_once(signal, &refires)).unwrap();
    env.connect(signal, recording(&listener_calls)).unwrap();
    spawn_waiter(&mut env, signal, &waiter_calls);

    env.fire(signal, &[Value::from("outer")]).unwrap();

    // The nested fire runs to completion first, waiter included
    assert_eq!(refires.get(), 2);
    assert_eq!(
        *listener_calls.borrow(),
        vec![vec![Value::from("inner")], vec![Value::from("outer")]]
    );
    assert_eq!(*waiter_calls.borrow(), vec![vec![Value::from("inner")]]);
    assert_eq!(env.waiting_on(signal), 0);
    assert_eq!(env.stats().fires, 2);
    assert_eq!(env.stats().failures, 0);
}

#[test]
fn test_task_that_waits_then_fires_keeps_its_wait() {
    let mut env = Environment::new();
    let signal = env.create_signal();
    let seen = new_calls();
    let recorder = Rc::clone(&seen);
    let mut waited = false;

    let task = env.create_task(
        "wait_then_fire",
        from_fn(move |cx, args| {
            if !waited {
                waited = true;
                cx.wait(signal)?;
                cx.fire(signal, &[Value::from("own")])?;
                return Ok(TaskStatus::Suspended);
            }
            recorder.borrow_mut().push(args);
            Ok(TaskStatus::Finished)
        }),
    );

    env.resume(&task, Vec::new()).unwrap();
    assert_eq!(env.stats().failures, 0);
    assert_eq!(env.waiting_on(signal), 1);
    assert!(seen.borrow().is_empty());

    env.fire(signal, &[Value::from("x")]).unwrap();
    assert_eq!(*seen.borrow(), vec![vec![Value::from("x")]]);
    assert!(task.is_dead());
    assert_eq!(env.waiting_on(signal), 0);
}
