use partition_table_store::{PartitionedTableStore, Record, StoreConfig, TableBackend};

const TABLE: &str = "expenses";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║  PARTITION TABLE STORE - Segmented Table Access    ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let config = StoreConfig::from_env()?;

    #[cfg(feature = "azure")]
    {
        if let Some(account) = config.account()? {
            println!("▶ Using Azure Table Storage account {}", account.name);
            let backend = partition_table_store::AzureTableBackend::new(&account);
            return demo(PartitionedTableStore::new(backend)).await;
        }
    }

    println!(
        "▶ Using in-memory table store ({} rows per segment)",
        config.segment_size
    );
    let backend = partition_table_store::MemoryBackend::with_segment_size(config.segment_size);
    demo(PartitionedTableStore::new(backend)).await
}

async fn demo<B: TableBackend>(store: PartitionedTableStore<B>) -> anyhow::Result<()> {
    let account = store.sanitize_key("alice@example.com/checking#main");
    println!("  ✓ Partition key sanitized to {}\n", account);

    println!("▶ Inserting expenses...");
    let expenses = [
        ("0001", "Bakery", 4.5),
        ("0002", "Grocer", 52.25),
        ("0003", "Cinema", 18.0),
    ];
    for (id, payee, amount) in expenses {
        let record = Record::new(account.as_str(), id)
            .with_field("payee", payee)
            .with_field("amount", amount);
        let inserted = store.insert(TABLE, &record).await?;
        println!("  ✓ INSERT {} {} = {} (inserted: {})", id, payee, amount, inserted);
    }

    let duplicate = Record::new(account.as_str(), "0001").with_field("payee", "Duplicate");
    let inserted = store.insert(TABLE, &duplicate).await?;
    println!("  ✓ INSERT 0001 again (inserted: {})\n", inserted);

    println!("▶ Fetching partition {}...", account);
    let rows = store.get_all(TABLE, &account).await?;
    println!("  ✓ Found {} rows:", rows.len());
    for row in &rows {
        println!("    - {} {:?}", row.row_key(), row.fields());
    }
    println!();

    println!("▶ Fetching single expense...");
    match store.get_one(TABLE, &account, "0002").await? {
        Some(row) => println!("  ✓ GET 0002 = {:?}", row.fields()),
        None => println!("  ✓ GET 0002 = <not found>"),
    }

    println!("\n▶ Deleting expense 0003...");
    let deleted = store.delete(TABLE, &account, "0003").await?;
    println!("  ✓ DELETE 0003 (deleted: {})", deleted);
    let deleted = store.delete(TABLE, &account, "0003").await?;
    println!("  ✓ DELETE 0003 again (deleted: {})", deleted);

    let remaining = store.get_all(TABLE, &account).await?.len();
    println!("\n✅ Done, {} rows remain in the partition.\n", remaining);

    Ok(())
}
