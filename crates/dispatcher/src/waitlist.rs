use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::registry::Reservation;

/// 等待服务者的订单
pub(crate) struct Waiter {
    /// 全局到达序号，跨专长比较先后
    pub seq: u64,
    pub sender: oneshot::Sender<Reservation>,
}

/// 按专长分组的先进先出等待队列
#[derive(Default)]
pub(crate) struct WaitList {
    queues: HashMap<String, VecDeque<Waiter>>,
    next_seq: u64,
}

impl WaitList {
    pub fn enqueue(&mut self, specialty: &str) -> oneshot::Receiver<Reservation> {
        let (sender, receiver) = oneshot::channel();
        let queue = self.queues.entry(specialty.to_string()).or_default();
        queue.retain(|waiter| !waiter.sender.is_closed());
        queue.push_back(Waiter {
            seq: self.next_seq,
            sender,
        });
        self.next_seq += 1;
        receiver
    }

    /// 在这些专长的队首中取出最早到达的等待者，已放弃的等待者会被丢弃
    pub fn pop_earliest(&mut self, specialties: &BTreeSet<String>) -> Option<(String, Waiter)> {
        let mut earliest: Option<(&String, u64)> = None;

        for specialty in specialties {
            let Some(queue) = self.queues.get_mut(specialty) else {
                continue;
            };
            while queue.front().is_some_and(|w| w.sender.is_closed()) {
                queue.pop_front();
            }
            if let Some(front) = queue.front() {
                if earliest.map_or(true, |(_, seq)| front.seq < seq) {
                    earliest = Some((specialty, front.seq));
                }
            }
        }

        let (specialty, _) = earliest?;
        let queue = self.queues.get_mut(specialty)?;
        let waiter = queue.pop_front()?;
        if queue.is_empty() {
            self.queues.remove(specialty);
        }
        Some((specialty.clone(), waiter))
    }

    pub fn waiting(&self, specialty: &str) -> usize {
        self.queues.get(specialty).map_or(0, |queue| {
            queue.iter().filter(|w| !w.sender.is_closed()).count()
        })
    }

    pub fn total(&self) -> usize {
        self.queues
            .values()
            .flat_map(|queue| queue.iter())
            .filter(|w| !w.sender.is_closed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fifo_within_specialty() {
        let mut list = WaitList::default();
        let _first = list.enqueue("pasta");
        let _second = list.enqueue("pasta");

        let (specialty, waiter) = list.pop_earliest(&tags(&["pasta"])).unwrap();
        assert_eq!(specialty, "pasta");
        assert_eq!(waiter.seq, 0);
        assert_eq!(list.waiting("pasta"), 1);
    }

    #[test]
    fn test_earliest_across_specialties() {
        let mut list = WaitList::default();
        let _meat = list.enqueue("meat");
        let _dessert = list.enqueue("dessert");

        let (specialty, _) = list.pop_earliest(&tags(&["dessert", "meat"])).unwrap();
        assert_eq!(specialty, "meat");

        assert!(list.pop_earliest(&tags(&["pasta"])).is_none());
        assert_eq!(list.total(), 1);
    }

    #[test]
    fn test_abandoned_waiters_are_skipped() {
        let mut list = WaitList::default();
        let abandoned = list.enqueue("pasta");
        let _alive = list.enqueue("pasta");
        drop(abandoned);

        assert_eq!(list.waiting("pasta"), 1);
        let (_, waiter) = list.pop_earliest(&tags(&["pasta"])).unwrap();
        assert_eq!(waiter.seq, 1);
        assert!(list.pop_earliest(&tags(&["pasta"])).is_none());
    }
}
