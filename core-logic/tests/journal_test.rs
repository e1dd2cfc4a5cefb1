use core_logic::{ActionJournal, JournalEntry};

fn entry(wallet: &str, mode: &str, success: bool) -> JournalEntry {
    JournalEntry {
        wallet_address: wallet.to_string(),
        mode: mode.to_string(),
        action: "bridge".to_string(),
        success,
        message: "base -> arbitrum".to_string(),
        duration_ms: 1200,
    }
}

#[tokio::test]
async fn test_journal_records_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let journal = ActionJournal::open(&dir.path().join("journal.db"))
        .await
        .unwrap();

    journal.record(&entry("0xabc", "warmup", true)).await.unwrap();
    journal.record(&entry("0xabc", "warmup", false)).await.unwrap();
    journal.record(&entry("0xabc", "volume", true)).await.unwrap();
    journal.record(&entry("0xdef", "warmup", true)).await.unwrap();

    assert_eq!(journal.success_count("0xabc", "warmup").await.unwrap(), 1);
    assert_eq!(journal.success_count("0xabc", "volume").await.unwrap(), 1);

    let recent = journal.recent("0xabc", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].mode, "volume");
    assert_eq!(recent[1].status, "FAILED");

    let metrics = journal.metrics();
    assert_eq!(metrics.total_inserts, 4);
    assert_eq!(metrics.total_errors, 0);
}

#[tokio::test]
async fn test_journal_reopens_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("journal.db");

    let journal = ActionJournal::open(&path).await.unwrap();
    journal.record(&entry("0xabc", "collector", true)).await.unwrap();
    journal.close().await;

    let reopened = ActionJournal::open(&path).await.unwrap();
    assert_eq!(reopened.success_count("0xabc", "collector").await.unwrap(), 1);
}
