//! Decisions that span several activities: what happens to running activities when a new one
//! starts, and picking up activities that were cut short by a break.
//!
//! Activities ended as a side effect of the same moment share one `<u>` stamp. That stamp is the
//! only link between them, so every batch here computes it once and passes it down.

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, instrument};

use crate::ledger::row::ActivityId;

use super::{
    queries::{ActiveActivity, ResumeCandidate},
    EndReceipt, EndRequest, Outcome, Planner, Receipt, StartRequest,
};

/// A live start that collides with running activities and waits for the caller to decide.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStart {
    pub request: StartRequest,
    pub active: Vec<ActiveActivity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(Receipt),
    NeedsDecision(PendingStart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapChoice {
    /// End everything that is running, then start.
    EndActive,
    /// Start alongside the running activities.
    Multitask,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndWithResume {
    pub ended: EndReceipt,
    pub candidates: Vec<ResumeCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakOutcome {
    Started {
        receipt: Receipt,
        interrupted: Vec<ActivityId>,
    },
    Ended {
        ended: Vec<EndReceipt>,
        candidates: Vec<ResumeCandidate>,
    },
}

impl Planner {
    /// Starts right away unless the start is live and something else is running.
    #[instrument(skip(self), fields(name = %request.name))]
    pub async fn request_start(&self, request: StartRequest) -> Result<StartOutcome> {
        if !self.is_live(request.date, request.start) {
            return Ok(StartOutcome::Started(self.start(request).await?));
        }

        let active = self
            .active(request.date)
            .await
            .into_iter()
            .filter(|v| v.name != request.name && Some(&v.id) != request.existing_id.as_ref())
            .collect::<Vec<_>>();
        if active.is_empty() {
            return Ok(StartOutcome::Started(self.start(request).await?));
        }
        debug!("{} activities are running, asking what to do", active.len());
        Ok(StartOutcome::NeedsDecision(PendingStart { request, active }))
    }

    /// Applies the caller's decision. [None] when the start was cancelled.
    #[instrument(skip(self, pending), fields(name = %pending.request.name))]
    pub async fn resolve_overlap(
        &self,
        pending: PendingStart,
        choice: OverlapChoice,
    ) -> Result<Option<Receipt>> {
        let PendingStart { request, active } = pending;
        match choice {
            OverlapChoice::Cancel => {
                info!("Start of {} cancelled", request.name);
                Ok(None)
            }
            OverlapChoice::Multitask => Ok(Some(self.start(request).await?)),
            OverlapChoice::EndActive => {
                let stamp =
                    self.stamp_for(request.date, request.start, request.precise_timestamp);
                self.end_all(request.date, &active, request.start, stamp)
                    .await?;
                let receipt = self
                    .start(StartRequest {
                        precise_timestamp: Some(stamp),
                        ..request
                    })
                    .await?;
                Ok(Some(receipt))
            }
        }
    }

    /// Ends an activity and looks up what was interrupted when it started.
    #[instrument(skip(self), fields(name = %request.name))]
    pub async fn end_with_resume(&self, request: EndRequest) -> Result<Outcome<EndWithResume>> {
        let date = request.date;
        let name = request.name.clone();
        let Outcome::Applied(ended) = self.end(request).await? else {
            return Ok(Outcome::Unresolved);
        };
        let candidates = match ended.start_stamp {
            Some(stamp) => {
                let candidates = self.resume_candidates(date, &name, stamp).await;
                self.drop_running(date, candidates).await
            }
            None => Vec::new(),
        };
        Ok(Outcome::Applied(EndWithResume { ended, candidates }))
    }

    /// Starts every candidate now, each running until its original plan. Refreshes once.
    #[instrument(skip(self, candidates))]
    pub async fn resume(
        &self,
        date: NaiveDate,
        candidates: &[ResumeCandidate],
    ) -> Result<Vec<Receipt>> {
        let now = self.clock.minute();
        let stamp = self.clock.timestamp_millis();
        let mut receipts = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let receipt = self
                .start(StartRequest {
                    // A plan that already passed would end the row before it starts.
                    planned_end: candidate.resume_until.filter(|end| *end > now),
                    precise_timestamp: Some(stamp),
                    skip_refresh: i + 1 < candidates.len(),
                    ..StartRequest::new(date, &candidate.name, now)
                })
                .await?;
            receipts.push(receipt);
        }
        info!("Resumed {} activities", receipts.len());
        Ok(receipts)
    }

    /// Ends the running break, or interrupts everything and starts one.
    #[instrument(skip(self))]
    pub async fn toggle_break(&self) -> Result<BreakOutcome> {
        let date = self.clock.today();
        let now = self.clock.minute();
        let stamp = self.clock.timestamp_millis();
        let active = self.active(date).await;
        let breaks = active
            .iter()
            .filter(|v| v.name == self.break_name)
            .collect::<Vec<_>>();

        if breaks.is_empty() {
            let interrupted = self.end_all(date, &active, now, stamp).await?;
            let receipt = self
                .start(StartRequest {
                    precise_timestamp: Some(stamp),
                    ..StartRequest::new(date, &self.break_name, now)
                })
                .await?;
            return Ok(BreakOutcome::Started {
                receipt,
                interrupted,
            });
        }

        let mut ended = Vec::with_capacity(breaks.len());
        let mut candidates: Vec<ResumeCandidate> = Vec::new();
        for (i, running) in breaks.iter().enumerate() {
            let outcome = self
                .end(EndRequest {
                    id: Some(running.id.clone()),
                    precise_timestamp: Some(stamp),
                    skip_refresh: i + 1 < breaks.len(),
                    ..EndRequest::new(date, &running.name, now)
                })
                .await?;
            let Outcome::Applied(receipt) = outcome else {
                continue;
            };
            if let Some(start_stamp) = receipt.start_stamp {
                for candidate in self
                    .resume_candidates(date, &self.break_name, start_stamp)
                    .await
                {
                    if !candidates.iter().any(|v| v.id == candidate.id) {
                        candidates.push(candidate);
                    }
                }
            }
            ended.push(receipt);
        }
        let candidates = self.drop_running(date, candidates).await;
        Ok(BreakOutcome::Ended { ended, candidates })
    }

    /// Ends each of `active` by id at `time`, all with the same stamp and without refreshing.
    async fn end_all(
        &self,
        date: NaiveDate,
        active: &[ActiveActivity],
        time: NaiveTime,
        stamp: i64,
    ) -> Result<Vec<ActivityId>> {
        let mut ended = Vec::with_capacity(active.len());
        for activity in active {
            let outcome = self
                .end(EndRequest {
                    id: Some(activity.id.clone()),
                    precise_timestamp: Some(stamp),
                    skip_refresh: true,
                    ..EndRequest::new(date, &activity.name, time)
                })
                .await?;
            if let Outcome::Applied(receipt) = outcome {
                ended.push(receipt.receipt.id);
            }
        }
        Ok(ended)
    }

    async fn resume_candidates(
        &self,
        date: NaiveDate,
        ended_name: &str,
        stamp: i64,
    ) -> Vec<ResumeCandidate> {
        let break_name = self.break_name.as_str();
        let exclude = if ended_name == break_name {
            vec![break_name]
        } else {
            vec![break_name, ended_name]
        };
        self.interrupted(date, stamp, &exclude).await
    }

    async fn drop_running(
        &self,
        date: NaiveDate,
        candidates: Vec<ResumeCandidate>,
    ) -> Vec<ResumeCandidate> {
        if candidates.is_empty() {
            return candidates;
        }
        let running = self.active(date).await;
        candidates
            .into_iter()
            .filter(|c| !running.iter().any(|r| r.name == c.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::ledger::{
        replicas::ActorClass,
        row::ActivityId,
        store::{FileStore, LocalFileStore},
        tags::Cell,
    };

    use super::{
        super::{
            test_support::{clock_at, hm, planner_at, DATE},
            EndRequest, Outcome, StartRequest,
        },
        BreakOutcome, OverlapChoice, StartOutcome,
    };
    use crate::utils::clock::Clock;

    #[tokio::test]
    async fn test_overlap_needs_decision_only_when_live() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 9, 0);
        planner
            .start(StartRequest::new(DATE, "Writing", hm(9, 0)))
            .await?;

        let outcome = planner
            .request_start(StartRequest::new(DATE, "Lunch", hm(12, 0)))
            .await?;
        assert!(matches!(outcome, StartOutcome::Started(_)));

        let outcome = planner
            .request_start(StartRequest::new(DATE, "Writing", hm(9, 0)))
            .await?;
        assert!(matches!(outcome, StartOutcome::Started(_)));

        let outcome = planner
            .request_start(StartRequest::new(DATE, "Reading", hm(9, 0)))
            .await?;
        let StartOutcome::NeedsDecision(pending) = outcome else {
            panic!("expected a decision");
        };
        assert_eq!(pending.active.len(), 2);
        assert!(pending.active.iter().all(|v| v.name == "Writing"));
        Ok(())
    }

    #[tokio::test]
    async fn test_end_active_shares_one_stamp() -> Result<()> {
        let dir = tempdir()?;
        let (planner, refreshes) = planner_at(dir.path(), ActorClass::Primary, 9, 30);
        planner
            .start(StartRequest::new(DATE, "Writing", hm(9, 0)))
            .await?;
        planner
            .start(StartRequest::new(DATE, "Music", hm(9, 10)))
            .await?;
        let before = refreshes.load(Ordering::SeqCst);

        let StartOutcome::NeedsDecision(pending) = planner
            .request_start(StartRequest {
                precise_timestamp: Some(4242),
                ..StartRequest::new(DATE, "Reading", hm(9, 30))
            })
            .await?
        else {
            panic!("expected a decision");
        };
        let receipt = planner
            .resolve_overlap(pending, OverlapChoice::EndActive)
            .await?
            .unwrap();
        assert_eq!(receipt.row.start, "09:30 <u4242>");
        assert_eq!(refreshes.load(Ordering::SeqCst), before + 1);

        let ledger = planner.ledger(DATE).await;
        for id in [1, 2] {
            let record = ledger.get(&ActivityId::from(id)).unwrap();
            assert_eq!(record.end_cell().time(), Some(hm(9, 30)));
            assert!(record.end_cell().has_stamp(4242));
        }
        assert_eq!(planner.active(DATE).await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_and_multitask() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 9, 30);
        planner
            .start(StartRequest::new(DATE, "Writing", hm(9, 0)))
            .await?;
        let StartOutcome::NeedsDecision(pending) = planner
            .request_start(StartRequest::new(DATE, "Reading", hm(9, 30)))
            .await?
        else {
            panic!("expected a decision");
        };

        assert!(planner
            .resolve_overlap(pending.clone(), OverlapChoice::Cancel)
            .await?
            .is_none());
        assert_eq!(planner.ledger(DATE).await.len(), 1);

        planner
            .resolve_overlap(pending, OverlapChoice::Multitask)
            .await?
            .unwrap();
        assert_eq!(planner.active(DATE).await.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_break_interrupts_and_offers_resume() -> Result<()> {
        let dir = tempdir()?;
        let (planner, refreshes) = planner_at(dir.path(), ActorClass::Primary, 9, 30);
        planner
            .start(StartRequest {
                planned_end: Some(hm(10, 0)),
                ..StartRequest::new(DATE, "Writing", hm(9, 0))
            })
            .await?;
        let before = refreshes.load(Ordering::SeqCst);

        let BreakOutcome::Started {
            receipt,
            interrupted,
        } = planner.toggle_break().await?
        else {
            panic!("expected a break to start");
        };
        let stamp = clock_at(9, 30).timestamp_millis();
        assert_eq!(interrupted, vec![ActivityId::from(1)]);
        assert_eq!(receipt.row.name, "Break");
        assert_eq!(Cell::parse(&receipt.row.start).last_stamp(), Some(stamp));
        assert_eq!(refreshes.load(Ordering::SeqCst), before + 1);

        let ledger = planner.ledger(DATE).await;
        let writing = ledger.get(&ActivityId::from(1)).unwrap();
        assert_eq!(writing.end, format!("09:30 <t10-00> <u{stamp}>"));

        let (later, _) = planner_at(dir.path(), ActorClass::Primary, 9, 50);
        let BreakOutcome::Ended { ended, candidates } = later.toggle_break().await? else {
            panic!("expected the break to end");
        };
        assert_eq!(ended.len(), 1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Writing");
        assert_eq!(candidates[0].resume_until, Some(hm(10, 0)));

        let resumed = later.resume(DATE, &candidates).await?;
        assert_eq!(resumed[0].id, ActivityId::from(3));
        assert!(resumed[0].row.start.starts_with("09:50 <u"));
        assert_eq!(resumed[0].row.end, "10:00");
        Ok(())
    }

    #[tokio::test]
    async fn test_end_with_resume_skips_running_and_self() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 11, 0);
        LocalFileStore
            .write(
                &planner.layout().primary_file(DATE),
                "| 1 | Writing | 09:00 <u1> | 10:00 <t10-30> <u77> |\n\
                 | 2 | Reading | 09:00 <u1> | 10:00 <u77> |\n\
                 | 3 | Call | 10:00 <u77> | <end-3> |\n\
                 | 4 | Reading | 10:30 <u90> | <end-4> |\n",
            )
            .await?;

        let result = planner
            .end_with_resume(EndRequest::new(DATE, "Call", hm(11, 0)))
            .await?
            .applied()
            .unwrap();
        assert_eq!(result.ended.start_stamp, Some(77));
        assert_eq!(
            result
                .candidates
                .iter()
                .map(|v| (v.name.as_str(), v.resume_until))
                .collect::<Vec<_>>(),
            vec![("Writing", Some(hm(10, 30)))]
        );

        let missing = planner
            .end_with_resume(EndRequest::new(DATE, "Nothing", hm(11, 0)))
            .await?;
        assert_eq!(missing, Outcome::Unresolved);
        Ok(())
    }

    #[tokio::test]
    async fn test_end_active_leaves_same_named_plan_alone() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 9, 30);
        LocalFileStore
            .write(
                &planner.layout().primary_file(DATE),
                "| 1 | Writing | 09:00 <u1> | <end-1> |\n| 2 | Writing | 14:00 | <end-2> |\n",
            )
            .await?;

        let StartOutcome::NeedsDecision(pending) = planner
            .request_start(StartRequest::new(DATE, "Reading", hm(9, 30)))
            .await?
        else {
            panic!("expected a decision");
        };
        assert_eq!(
            pending.active.iter().map(|v| v.id.clone()).collect::<Vec<_>>(),
            vec![ActivityId::from(1)]
        );
        planner
            .resolve_overlap(pending, OverlapChoice::EndActive)
            .await?
            .unwrap();

        let ledger = planner.ledger(DATE).await;
        assert_eq!(
            ledger.get(&ActivityId::from(1)).unwrap().end_cell().time(),
            Some(hm(9, 30))
        );
        assert_eq!(ledger.get(&ActivityId::from(2)).unwrap().end, "<end-2>");
        assert_eq!(
            planner
                .active(DATE)
                .await
                .into_iter()
                .map(|v| v.name)
                .collect::<Vec<_>>(),
            vec!["Reading"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_break_end_leaves_planned_break_alone() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 10, 0);
        LocalFileStore
            .write(
                &planner.layout().primary_file(DATE),
                "| 1 | Break | 09:40 <u1> | <end-1> |\n| 2 | Break | 15:00 | <end-2> |\n",
            )
            .await?;

        let BreakOutcome::Ended { ended, .. } = planner.toggle_break().await? else {
            panic!("expected the break to end");
        };
        assert_eq!(
            ended.iter().map(|v| v.receipt.id.clone()).collect::<Vec<_>>(),
            vec![ActivityId::from(1)]
        );
        let ledger = planner.ledger(DATE).await;
        assert!(ledger
            .get(&ActivityId::from(1))
            .unwrap()
            .end
            .starts_with("10:00 <u"));
        assert_eq!(ledger.get(&ActivityId::from(2)).unwrap().end, "<end-2>");
        assert!(planner.active(DATE).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_drops_plan_that_already_passed() -> Result<()> {
        let dir = tempdir()?;
        let (planner, _) = planner_at(dir.path(), ActorClass::Primary, 10, 30);
        let receipts = planner
            .resume(
                DATE,
                &[super::ResumeCandidate {
                    id: ActivityId::from(1),
                    name: "Writing".into(),
                    resume_until: Some(hm(10, 0)),
                }],
            )
            .await?;
        assert!(receipts[0].row.start.starts_with("10:30 <u"));
        assert_eq!(receipts[0].row.end, "<end-1>");
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_refreshes_once() -> Result<()> {
        let dir = tempdir()?;
        let (planner, refreshes) = planner_at(dir.path(), ActorClass::Primary, 11, 0);
        let candidates = vec![
            super::ResumeCandidate {
                id: ActivityId::from(1),
                name: "Writing".into(),
                resume_until: None,
            },
            super::ResumeCandidate {
                id: ActivityId::from(2),
                name: "Reading".into(),
                resume_until: Some(hm(12, 0)),
            },
        ];
        let receipts = planner.resume(DATE, &candidates).await?;
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].row.start, receipts[1].row.start);
        assert_eq!(receipts[0].row.end, "<end-1>");
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
