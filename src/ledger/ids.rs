use super::{replicas::ActorClass, row::numeric_row_id};

/// Ids below this belong to the primary actor, the rest to the alternate device.
pub const ALTERNATE_ID_FLOOR: u64 = 100;

/// Next free id for `actor` given the current text of its primary file. [None] once the primary
/// range is used up.
///
/// Only ids already present in that one file are considered, so two writers creating rows for
/// the same date at the same time can collide. The planner assumes a single writer per date.
pub fn next_activity_id(primary_text: &str, actor: ActorClass) -> Option<u64> {
    let mut max_primary = 0;
    let mut max_alternate = ALTERNATE_ID_FLOOR;
    for id in primary_text.lines().filter_map(numeric_row_id) {
        if id < ALTERNATE_ID_FLOOR {
            max_primary = max_primary.max(id);
        } else {
            max_alternate = max_alternate.max(id);
        }
    }
    match actor {
        ActorClass::Primary => Some(max_primary + 1).filter(|v| *v < ALTERNATE_ID_FLOOR),
        ActorClass::AlternateDevice => max_alternate.checked_add(1),
    }
}

/// Next `LogID` of an audit file.
pub fn next_log_id(audit_text: &str) -> u64 {
    audit_text
        .lines()
        .filter_map(numeric_row_id)
        .max()
        .unwrap_or(0)
        + 1
}

/// Next id of a consumption log. Unlike agenda ids there is no upper bound for the primary actor,
/// the alternate device just starts above [ALTERNATE_ID_FLOOR].
pub fn next_consumption_id(log_text: &str, actor: ActorClass) -> u64 {
    let max = log_text.lines().filter_map(numeric_row_id).max().unwrap_or(0);
    match actor {
        ActorClass::AlternateDevice if max < ALTERNATE_ID_FLOOR => ALTERNATE_ID_FLOOR + 1,
        _ => max + 1,
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::{
        replicas::ActorClass,
        row::{ActivityId, AgendaRow},
    };

    use super::{next_activity_id, next_consumption_id, next_log_id, ALTERNATE_ID_FLOOR};

    #[test]
    fn test_empty_file() {
        assert_eq!(next_activity_id("", ActorClass::Primary), Some(1));
        assert_eq!(next_activity_id("", ActorClass::AlternateDevice), Some(101));
        assert_eq!(next_log_id(""), 1);
    }

    #[test]
    fn test_classes_are_partitioned() {
        let text = "| id | a | b | c |\n| --- | - | - | - |\n| 4 | a | 09:00 | 10:00 |\n| 120 | b | 09:00 | 10:00 |\n| 2 | c | 09:00 | 10:00 |\n";
        assert_eq!(next_activity_id(text, ActorClass::Primary), Some(5));
        assert_eq!(next_activity_id(text, ActorClass::AlternateDevice), Some(121));
    }

    #[test]
    fn test_consecutive_allocation_stays_in_range() {
        for actor in [ActorClass::Primary, ActorClass::AlternateDevice] {
            let mut text = String::new();
            for _ in 0..99 {
                let id = next_activity_id(&text, actor).unwrap();
                match actor {
                    ActorClass::Primary => assert!(id < ALTERNATE_ID_FLOOR),
                    ActorClass::AlternateDevice => assert!(id > ALTERNATE_ID_FLOOR),
                }
                text += &AgendaRow::new(ActivityId::from(id), "x", "09:00", "10:00").to_line();
                text.push('\n');
            }
        }
    }

    #[test]
    fn test_primary_range_exhausted() {
        let text = "| 99 | a | 09:00 | 10:00 |\n";
        assert_eq!(next_activity_id(text, ActorClass::Primary), None);
        assert_eq!(next_activity_id(text, ActorClass::AlternateDevice), Some(101));
    }

    #[test]
    fn test_log_ids() {
        let text = "| LogID | ActID | Date | Time | Activity | Start | End |\n|---|---|---|---|---|---|---|\n| 1 | 3 | 2025-11-10 | 09:00 | a | 09:00 |  |\n| 7 | 3 | 2025-11-10 | 09:00 | a | 09:00 |  |\n";
        assert_eq!(next_log_id(text), 8);
    }

    #[test]
    fn test_consumption_ids() {
        assert_eq!(next_consumption_id("", ActorClass::Primary), 1);
        assert_eq!(next_consumption_id("", ActorClass::AlternateDevice), 101);

        let text = "| id | Date | Item | Time | Amount |\n|---|---|---|---|---|\n| 3 | 2025-11-10 | Tea | 09:00 | 1 |\n";
        assert_eq!(next_consumption_id(text, ActorClass::Primary), 4);
        assert_eq!(next_consumption_id(text, ActorClass::AlternateDevice), 101);

        let text = "| 3 | 2025-11-10 | Tea | 09:00 | 1 |\n| 104 | 2025-11-10 | Tea | 10:00 | 1 |\n";
        assert_eq!(next_consumption_id(text, ActorClass::Primary), 105);
        assert_eq!(next_consumption_id(text, ActorClass::AlternateDevice), 105);
    }
}
