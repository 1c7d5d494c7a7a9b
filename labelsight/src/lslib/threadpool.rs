use labelsight_domain::{LsError, LsResult, lserr, to_ls};
use tracing::{debug, error, info, warn};

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        mpsc::{self, Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

pub type Job<T> = Box<dyn FnOnce() -> T + Send + 'static>;

fn poll<T, F1: FnMut() -> Option<T>, F2: Fn() -> bool>(
    query_result: &mut F1,
    interval_millis: u64,
    predicate: &F2,
) -> Option<T> {
    let interval = Duration::from_millis(interval_millis);
    let mut res = query_result();
    while res.is_none() && predicate() {
        thread::sleep(interval);
        res = query_result();
    }
    res
}

fn poll_until_result<T, F: FnMut() -> Option<T>>(
    query_result: &mut F,
    interval_millis: u64,
) -> Option<T> {
    let predicate = || true;
    poll(query_result, interval_millis, &predicate)
}

enum Message<J> {
    Terminate,
    NewJob(J),
}

type Answer<T> = (u128, LsResult<T>);
type SharedRx<T> = Arc<Mutex<Receiver<Message<(u128, Job<T>)>>>>;
type StartTimes = Arc<Mutex<HashMap<u128, Instant>>>;

fn panic_message(e: &(dyn Any + Send)) -> &str {
    e.downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| e.downcast_ref::<&'static str>().copied())
        .unwrap_or("no panic message")
}

fn send_answer_message<T>(
    job_id: u128,
    f: Job<T>,
    tx_from_pool: &Sender<Answer<T>>,
    idx_thread: usize,
) {
    let answer = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|e| {
        let msg = panic_message(e.as_ref());
        error!("job {job_id} panicked on thread {idx_thread}, {msg}");
        lserr!("job panicked, {}", msg)
    });
    match tx_from_pool.send((job_id, answer)) {
        Ok(_) => {
            debug!("thread {idx_thread} sent result of job {job_id}");
        }
        Err(e) => {
            error!("thread {idx_thread} could not send result of job {job_id}. receiver gone.");
            error!("error: {e:?}");
        }
    }
}

fn spawn_worker<T: Send + 'static>(
    idx_thread: usize,
    rx_to_pool: SharedRx<T>,
    tx_from_pool: Sender<Answer<T>>,
    started: StartTimes,
) {
    let thread = move || -> LsResult<()> {
        debug!("spawning thread {idx_thread}");
        loop {
            let received_msg = rx_to_pool.lock().map_err(to_ls)?.recv().map_err(to_ls)?;
            match received_msg {
                Message::Terminate => {
                    debug!("shut down thread {idx_thread}");
                    return Ok(());
                }
                Message::NewJob((i, f)) => {
                    started.lock().map_err(to_ls)?.insert(i, Instant::now());
                    send_answer_message(i, f, &tx_from_pool, idx_thread);
                    started.lock().map_err(to_ls)?.remove(&i);
                }
            }
        }
    };
    thread::spawn(thread);
}

/// A job that has not started yet is always within its timeout.
fn is_within_timeout(started: &StartTimes, job_id: u128, timeout_millis: u128) -> bool {
    match started.lock() {
        Ok(started) => started
            .get(&job_id)
            .is_none_or(|t| t.elapsed().as_millis() < timeout_millis),
        Err(e) => {
            error!("cannot read start time of job {job_id}, {e:?}");
            false
        }
    }
}

/// Worker threads that share one job queue, so a busy worker never holds back queued jobs.
/// Results are fetched by the id returned from [`ThreadPool::apply`]. A panicking job is reported
/// as error of that job.
pub struct ThreadPool<T: Send + 'static> {
    tx_to_pool: Sender<Message<(u128, Job<T>)>>,
    rx_to_pool: SharedRx<T>,
    tx_from_pool: Sender<Answer<T>>,
    rx_from_pool: Receiver<Answer<T>>,
    started: StartTimes,
    n_threads: usize,
    n_workers: usize,
    job_id: u128,
    result_queue: Vec<Answer<T>>,
    abandoned: HashSet<u128>,
    interval_millis: u64,
    timeout_millis: Option<u128>,
}

impl<T: Send + 'static> ThreadPool<T> {
    pub fn new(n_threads: usize) -> Self {
        let n_threads = n_threads.max(1);
        let (tx_to_pool, rx_to_pool) = mpsc::channel();
        let rx_to_pool = Arc::new(Mutex::new(rx_to_pool));
        let (tx_from_pool, rx_from_pool) = mpsc::channel();
        let started = StartTimes::default();
        for idx_thread in 0..n_threads {
            spawn_worker(
                idx_thread,
                rx_to_pool.clone(),
                tx_from_pool.clone(),
                started.clone(),
            );
        }
        info!("started thread pool with {n_threads} threads");
        ThreadPool {
            tx_to_pool,
            rx_to_pool,
            tx_from_pool,
            rx_from_pool,
            started,
            n_threads,
            n_workers: n_threads,
            job_id: 0u128,
            result_queue: vec![],
            abandoned: HashSet::new(),
            interval_millis: 10,
            timeout_millis: None,
        }
    }

    /// [`ThreadPool::poll`] gives up on a job `timeout_millis` after a worker started it. Time
    /// spent in the queue does not count.
    #[must_use]
    pub fn with_timeout(mut self, timeout_millis: Option<u64>) -> Self {
        self.timeout_millis = timeout_millis.map(u128::from);
        self
    }

    /// Number of threads the pool was created with.
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Result of the job if it has finished already.
    pub fn result(&mut self, job_id: u128) -> Option<LsResult<T>> {
        let abandoned = &mut self.abandoned;
        self.result_queue.extend(
            self.rx_from_pool
                .try_iter()
                .filter(|(jid, _)| !abandoned.remove(jid)),
        );
        let vec_idx = self.result_queue.iter().position(|(jid, _)| job_id == *jid)?;
        let (_, v) = self.result_queue.remove(vec_idx);
        Some(v)
    }

    pub fn apply(&mut self, f: Job<T>) -> LsResult<u128> {
        let job_id = self.job_id;
        debug!("sending job {job_id}");
        self.tx_to_pool
            .send(Message::NewJob((job_id, f)))
            .map_err(|e| LsError::new(&e.to_string()))?;
        self.job_id = job_id.wrapping_add(1);
        Ok(job_id)
    }

    /// The worker of a timed out job keeps running until the job returns. A new worker takes
    /// over the queue and the late result is dropped.
    fn abandon(&mut self, job_id: u128) {
        warn!("giving up on job {job_id}, starting a replacement worker");
        self.abandoned.insert(job_id);
        spawn_worker(
            self.n_workers,
            self.rx_to_pool.clone(),
            self.tx_from_pool.clone(),
            self.started.clone(),
        );
        self.n_workers += 1;
    }

    /// Blocks until the result of the job is available or the job has been running for longer
    /// than the timeout. `job_id` must not have been fetched before.
    pub fn poll(&mut self, job_id: u128) -> Option<LsResult<T>> {
        let interv = self.interval_millis;
        let res = match self.timeout_millis {
            Some(to) => {
                let started = self.started.clone();
                let predicate = move || is_within_timeout(&started, job_id, to);
                poll(&mut || self.result(job_id), interv, &predicate)
            }
            None => poll_until_result(&mut || self.result(job_id), interv),
        };
        if res.is_none() {
            self.abandon(job_id);
        }
        res
    }
}

fn terminate_all_threads<T: Send + 'static>(tp: &ThreadPool<T>) -> LsResult<()> {
    for _ in 0..tp.n_workers {
        tp.tx_to_pool.send(Message::Terminate).map_err(to_ls)?;
    }
    Ok(())
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        if let Err(e) = terminate_all_threads(self) {
            error!("error when dropping threadpool, {e:?}");
        }
    }
}

#[cfg(test)]
fn make_test_job_sleep(res: usize, sleep_ms: u64) -> Job<usize> {
    Box::new(move || {
        thread::sleep(Duration::from_millis(sleep_ms));
        res
    })
}

#[test]
fn test_tp() -> LsResult<()> {
    let mut tp = ThreadPool::new(4);
    for i in 0..20 {
        let job_id = tp.apply(make_test_job_sleep(i, 10))?;
        assert_eq!(tp.poll(job_id), Some(Ok(i)));
    }
    assert_eq!(tp.result_queue.len(), 0);
    Ok(())
}

#[test]
fn test_tp_out_of_order() -> LsResult<()> {
    let mut tp = ThreadPool::new(2);
    let slow = tp.apply(make_test_job_sleep(1, 100))?;
    let fast = tp.apply(make_test_job_sleep(2, 0))?;
    assert_eq!(tp.poll(fast), Some(Ok(2)));
    assert_eq!(tp.result(slow), None);
    assert_eq!(tp.poll(slow), Some(Ok(1)));
    assert_eq!(tp.result(slow), None);
    Ok(())
}

#[test]
fn test_tp_timeout() -> LsResult<()> {
    let mut tp = ThreadPool::new(2).with_timeout(Some(30));
    let slow = tp.apply(make_test_job_sleep(1, 500))?;
    let fast = tp.apply(make_test_job_sleep(2, 0))?;
    assert_eq!(tp.poll(slow), None);
    assert_eq!(tp.poll(fast), Some(Ok(2)));
    assert_eq!(tp.n_threads(), 2);
    assert_eq!(ThreadPool::<usize>::new(0).n_threads(), 1);
    Ok(())
}

#[test]
fn test_tp_timeout_single_thread() -> LsResult<()> {
    let mut tp = ThreadPool::new(1).with_timeout(Some(50));
    let slow = tp.apply(make_test_job_sleep(1, 500))?;
    let fast_1 = tp.apply(make_test_job_sleep(2, 0))?;
    let fast_2 = tp.apply(make_test_job_sleep(3, 0))?;
    assert_eq!(tp.poll(slow), None);
    // the replacement worker picks up the queued jobs
    assert_eq!(tp.poll(fast_1), Some(Ok(2)));
    assert_eq!(tp.poll(fast_2), Some(Ok(3)));
    assert_eq!(tp.n_workers, 2);
    Ok(())
}

#[test]
fn test_tp_queue_time_not_counted() -> LsResult<()> {
    let mut tp = ThreadPool::new(1).with_timeout(Some(200));
    let first = tp.apply(make_test_job_sleep(1, 150))?;
    let second = tp.apply(make_test_job_sleep(2, 150))?;
    // second waits 150ms in the queue and runs another 150ms
    assert_eq!(tp.poll(second), Some(Ok(2)));
    assert_eq!(tp.poll(first), Some(Ok(1)));
    assert_eq!(tp.n_workers, 1);
    Ok(())
}

#[test]
fn test_tp_panicking_job() -> LsResult<()> {
    let mut tp = ThreadPool::<usize>::new(1);
    let bad = tp.apply(Box::new(|| -> usize { panic!("bad job") }))?;
    let good = tp.apply(make_test_job_sleep(2, 0))?;
    let err = tp.poll(bad).map(|r| r.unwrap_err());
    assert!(err.is_some_and(|e| e.msg().contains("bad job")));
    assert_eq!(tp.poll(good), Some(Ok(2)));
    Ok(())
}
