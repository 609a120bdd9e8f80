use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::ledger::consumption::{
    read_consumption, record_consumption, ConsumptionEntry, DEFAULT_AMOUNT,
};

use super::Planner;

impl Planner {
    /// Logs `item` as consumed right now. A blank `amount` counts as one.
    #[instrument(skip(self))]
    pub async fn consume(&self, item: &str, amount: Option<&str>) -> Result<ConsumptionEntry> {
        let amount = amount
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_AMOUNT);
        let entry = record_consumption(
            self.store.as_ref(),
            &self.consumption_dir,
            self.layout.actor(),
            self.clock.time(),
            item,
            amount,
        )
        .await?;
        info!("Recorded {}x {} at {}", entry.amount, entry.item, entry.time);
        if let Some(refresh) = &self.on_refresh {
            refresh();
        }
        Ok(entry)
    }

    /// Everything consumed on `date`, from every device.
    pub async fn consumption(&self, date: NaiveDate) -> Result<Vec<ConsumptionEntry>> {
        read_consumption(self.store.as_ref(), &self.consumption_dir, date).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::ledger::{
        consumption::consumption_file,
        replicas::ActorClass,
        store::{FileStore, LocalFileStore},
    };

    use super::super::test_support::{hm, planner_at, DATE};

    #[tokio::test]
    async fn test_consume_defaults_amount_and_refreshes() -> Result<()> {
        let dir = tempdir()?;
        let (planner, refreshes) = planner_at(dir.path(), ActorClass::Primary, 9, 15);

        let tea = planner.consume("Tea", None).await?;
        let coffee = planner.consume("Coffee", Some(" 2 ")).await?;
        let water = planner.consume("Water", Some("")).await?;
        assert_eq!((tea.id, coffee.id, water.id), (1, 2, 3));
        assert_eq!(tea.amount, "1");
        assert_eq!(coffee.amount, "2");
        assert_eq!(water.amount, "1");
        assert_eq!(tea.time, hm(9, 15));
        assert_eq!(refreshes.load(Ordering::SeqCst), 3);

        let path = consumption_file(&dir.path().join("consumption"), DATE, ActorClass::Primary);
        assert!(LocalFileStore
            .read(&path)
            .await?
            .ends_with("| 3 | 2025-11-10 | Water | 09:15 | 1 |\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_consumption_merges_devices() -> Result<()> {
        let dir = tempdir()?;
        let (desk, _) = planner_at(dir.path(), ActorClass::Primary, 9, 15);
        let (phone, _) = planner_at(dir.path(), ActorClass::AlternateDevice, 8, 40);

        desk.consume("Tea", None).await?;
        let water = phone.consume("Water", None).await?;
        assert_eq!(water.id, 101);

        let entries = desk.consumption(DATE).await?;
        assert_eq!(
            entries.iter().map(|v| (v.id, v.item.as_str())).collect::<Vec<_>>(),
            vec![(101, "Water"), (1, "Tea")]
        );
        assert!(desk.consumption(DATE.succ_opt().unwrap()).await?.is_empty());
        Ok(())
    }
}
