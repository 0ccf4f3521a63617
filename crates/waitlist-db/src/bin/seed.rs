//! # Seed Data Generator
//!
//! Creates a demo queue and fills it with customers for dashboard development.
//!
//! ## Usage
//! ```bash
//! # 12 customers (default)
//! cargo run -p waitlist-db --bin seed
//!
//! # Custom amount and database path
//! cargo run -p waitlist-db --bin seed -- --count 30 --db ./data/waitlist.db
//! ```
//!
//! ## Generated Data
//! - One open queue, "Main Dining", 10 minute average, capacity 40
//! - Customers joining two minutes apart, starting an hour ago
//! - The first two customers called, the first of those seated
//!
//! Logging follows `RUST_LOG` (default `info`).

use chrono::{Duration, Utc};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use waitlist_core::clock::{Clock, ManualClock};
use waitlist_core::code::generate_verification_code;
use waitlist_core::lifecycle;
use waitlist_core::{NewCustomer, NotificationKind, Queue};
use waitlist_db::{Database, DbConfig};

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bilal", "Chen", "Dara", "Emeka", "Fatima", "Goran", "Hana", "Ivo", "Jun", "Kofi",
    "Lena", "Mateo", "Noor", "Oskar", "Priya", "Quinn", "Rosa", "Sven", "Tariq",
];

const LAST_INITIALS: &[&str] = &["A.", "B.", "K.", "M.", "R.", "S.", "T."];

const NOTES: &[Option<&str>] = &[
    None,
    None,
    Some("High chair please"),
    None,
    Some("Window seat if possible"),
    None,
    Some("Wheelchair access"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 12;
    let mut db_path = String::from("./waitlist_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--count" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(12);
                    i += 1;
                }
            }
            "-d" | "--db" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("Waitlist Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of customers to add (default: 12)");
                println!("  -d, --db <PATH>    Database file path (default: ./waitlist_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Waitlist Seed Data Generator");
    println!("===============================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.queues().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} queues", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let clock = ManualClock::new(Utc::now() - Duration::hours(1));
    let now = clock.now();
    let queue = Queue {
        id: Uuid::new_v4().to_string(),
        merchant_id: Uuid::new_v4().to_string(),
        name: "Main Dining".to_string(),
        capacity: Some(40),
        average_service_minutes: 10,
        is_open: true,
        created_at: now,
        updated_at: now,
    };
    db.queues().create(&queue).await?;
    info!(queue_id = %queue.id, "Created demo queue");

    let mut joined = Vec::with_capacity(count);
    for n in 0..count {
        clock.advance(Duration::minutes(2));
        let now = clock.now();

        let mut uow = db.begin_queue(&queue.id, now).await?;
        let waiting = uow.waiting_count().await?;
        let mut customer = NewCustomer::new(
            format!(
                "{} {}",
                FIRST_NAMES[n % FIRST_NAMES.len()],
                LAST_INITIALS[n % LAST_INITIALS.len()]
            ),
            format!("+1 555 01{:02} {:04}", n % 100, 1000 + n),
            (n % 6) as i64 + 1,
        );
        customer.notes = NOTES[n % NOTES.len()].map(str::to_string);

        let entry = match lifecycle::admit(
            uow.queue(),
            waiting,
            customer,
            Uuid::new_v4().to_string(),
            generate_verification_code(),
            now,
        ) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("Stopped at customer {}: {}", n + 1, e);
                break;
            }
        };
        uow.insert_entry(&entry).await?;
        uow.reassign_positions().await?;
        uow.commit().await?;
        joined.push(entry);
    }
    println!("✓ Added {} customers", joined.len());

    // Call the first two, seat the first
    for (n, entry) in joined.iter().take(2).enumerate() {
        clock.advance(Duration::minutes(1));
        let now = clock.now();

        let mut uow = db.begin_queue(&queue.id, now).await?;
        let mut current = uow.entry(&entry.id).await?;
        lifecycle::call(&mut current, now)?;
        uow.save_entry(&current).await?;
        uow.reassign_positions().await?;
        uow.enqueue_notification(&current, NotificationKind::Called, &current.view(), now)
            .await?;

        if n == 0 {
            let code = current.verification_code.clone();
            lifecycle::seat(&mut current, &code, now)?;
            uow.save_entry(&current).await?;
        }
        uow.commit().await?;
    }

    let stats = db.entries().stats(&queue.id).await?;
    println!();
    println!("Queue {} ({})", queue.name, queue.id);
    println!("  Waiting:   {}", stats.waiting);
    println!("  Called:    {}", stats.called);
    println!("  Completed: {}", stats.completed);
    if let Some(avg) = stats.average_wait_minutes {
        println!("  Avg wait:  {:.1} min", avg);
    }

    println!();
    println!("Front of the line:");
    for entry in db.entries().list_waiting(&queue.id).await?.iter().take(5) {
        println!(
            "  #{:<3} {:<12} party of {:<2} ~{} min",
            entry.position.unwrap_or_default(),
            entry.customer_name,
            entry.party_size,
            entry.estimated_wait_minutes.unwrap_or_default()
        );
    }

    println!();
    println!("🎉 Seed complete!");

    db.close().await;
    Ok(())
}
