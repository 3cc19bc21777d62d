//! Postgres-backed `RecordStore` for billing-engine.

use std::time::Duration;

use billing_core::error::AppError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Customer, Debt, Invoice, InvoiceItem, InvoicePaymentUpdate, JournalEntry, JournalLine, Meter,
    MeterReading, Payment, TariffSlab,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::store::RecordStore;

const INVOICE_COLUMNS: &str = "invoice_id, invoice_number, customer_id, billing_period, \
    previous_reading, current_reading, consumption, consumption_amount, fixed_charge, \
    other_charges, subtotal, vat_rate, vat_amount, total, paid_amount, balance, status, \
    due_date, version, cancel_reason, created_utc, paid_utc, cancelled_utc";

const PAYMENT_COLUMNS: &str = "payment_id, receipt_number, customer_id, invoice_id, kind, \
    amount, method, status, cancel_reason, created_utc, cancelled_utc";

const DEBT_COLUMNS: &str = "debt_id, customer_id, debt_type, original_amount, penalty_amount, \
    paid_amount, remaining_amount, status, due_date, notes, is_deleted, created_utc";

const JOURNAL_COLUMNS: &str = "journal_id, entry_no, entry_date, entry_type, reference_type, \
    reference_id, reference_no, total_debit, total_credit, status, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for Database {
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, name, tariff_category, active, created_utc
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        timer.observe_duration();

        Ok(customer)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn list_active_meters(&self, customer_id: Uuid) -> Result<Vec<Meter>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_meters"])
            .start_timer();

        let meters = sqlx::query_as::<_, Meter>(
            r#"
            SELECT meter_id, customer_id, serial_no, active, created_utc
            FROM meters
            WHERE customer_id = $1 AND active = TRUE
            ORDER BY created_utc
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list meters: {}", e)))?;

        timer.observe_duration();

        Ok(meters)
    }

    #[instrument(skip(self), fields(meter_id = %meter_id, billing_period = %billing_period))]
    async fn find_unprocessed_reading(
        &self,
        meter_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<MeterReading>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_unprocessed_reading"])
            .start_timer();

        let reading = sqlx::query_as::<_, MeterReading>(
            r#"
            SELECT reading_id, meter_id, customer_id, billing_period, previous_reading,
                current_reading, processed, created_utc
            FROM meter_readings
            WHERE meter_id = $1 AND billing_period = $2 AND processed = FALSE
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(meter_id)
        .bind(billing_period)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to find reading: {}", e)))?;

        timer.observe_duration();

        Ok(reading)
    }

    #[instrument(skip(self), fields(category = %category))]
    async fn tariff_slabs(&self, category: &str) -> Result<Vec<TariffSlab>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["tariff_slabs"])
            .start_timer();

        let slabs = sqlx::query_as::<_, TariffSlab>(
            r#"
            SELECT slab_id, category, from_unit, to_unit, rate_per_unit, fixed_charge, created_utc
            FROM tariff_slabs
            WHERE category = $1
            ORDER BY from_unit
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to load tariff slabs: {}", e)))?;

        timer.observe_duration();

        Ok(slabs)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, billing_period = %billing_period))]
    async fn find_invoice_for_period(
        &self,
        customer_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice_for_period"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE customer_id = $1 AND billing_period = $2 AND status <> 'cancelled' \
             LIMIT 1"
        ))
        .bind(customer_id)
        .bind(billing_period)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to find invoice for period: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, invoice, items), fields(invoice_id = %invoice.invoice_id))]
    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
        reading_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin tx: {}", e)))?;

        let marked = sqlx::query(
            "UPDATE meter_readings SET processed = TRUE WHERE reading_id = $1 AND processed = FALSE",
        )
        .bind(reading_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to mark reading: {}", e)))?;

        if marked.rows_affected() == 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Reading {} already processed",
                reading_id
            )));
        }

        let created = sqlx::query_as::<_, Invoice>(&format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                     $18, $19, $20, $21, $22, $23) \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice.invoice_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.customer_id)
        .bind(&invoice.billing_period)
        .bind(invoice.previous_reading)
        .bind(invoice.current_reading)
        .bind(invoice.consumption)
        .bind(invoice.consumption_amount)
        .bind(invoice.fixed_charge)
        .bind(invoice.other_charges)
        .bind(invoice.subtotal)
        .bind(invoice.vat_rate)
        .bind(invoice.vat_amount)
        .bind(invoice.total)
        .bind(invoice.paid_amount)
        .bind(invoice.balance)
        .bind(&invoice.status)
        .bind(invoice.due_date)
        .bind(invoice.version)
        .bind(&invoice.cancel_reason)
        .bind(invoice.created_utc)
        .bind(invoice.paid_utc)
        .bind(invoice.cancelled_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice already exists for customer {} period {}",
                    invoice.customer_id,
                    invoice.billing_period
                ))
            }
            _ => AppError::Database(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (item_id, invoice_id, kind, description, from_unit,
                    to_unit, quantity, rate, amount, sort_order, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.item_id)
            .bind(item.invoice_id)
            .bind(&item.kind)
            .bind(&item.description)
            .bind(item.from_unit)
            .bind(item.to_unit)
            .bind(item.quantity)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.sort_order)
            .bind(item.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to insert item: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit invoice: {}", e)))?;

        timer.observe_duration();

        info!(
            invoice_id = %created.invoice_id,
            invoice_number = %created.invoice_number,
            total = %created.total,
            "Invoice persisted"
        );

        Ok(created)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_id, invoice_id, kind, description, from_unit, to_unit, quantity, rate,
                amount, sort_order, created_utc
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY sort_order, created_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get invoice items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self, update), fields(invoice_id = %invoice_id, expected_version = update.expected_version))]
    async fn update_invoice_payment(
        &self,
        invoice_id: Uuid,
        update: &InvoicePaymentUpdate,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_payment"])
            .start_timer();

        // Optimistic version check: no row matches when a concurrent
        // payment already bumped the version.
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices \
             SET paid_amount = $3, balance = $4, status = $5, paid_utc = $6, \
                 version = version + 1 \
             WHERE invoice_id = $1 AND version = $2 \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice_id)
        .bind(update.expected_version)
        .bind(update.paid_amount)
        .bind(update.balance)
        .bind(&update.status)
        .bind(update.paid_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to update invoice payment: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, reason), fields(invoice_id = %invoice_id))]
    async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices \
             SET status = 'cancelled', cancel_reason = $2, cancelled_utc = NOW(), \
                 version = version + 1 \
             WHERE invoice_id = $1 \
               AND status NOT IN ('cancelled', 'paid') \
               AND paid_amount = 0 \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to cancel invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(invoice_id = %inv.invoice_id, "Invoice cancelled");
        }

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn mark_overdue(&self, as_of: NaiveDate) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_overdue"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue', version = version + 1
            WHERE status IN ('issued', 'partial') AND due_date < $1
            "#,
        )
        .bind(as_of)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to mark overdue: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id))]
    async fn create_payment(&self, payment: &Payment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let created = sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.payment_id)
        .bind(&payment.receipt_number)
        .bind(payment.customer_id)
        .bind(payment.invoice_id)
        .bind(&payment.kind)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.status)
        .bind(&payment.cancel_reason)
        .bind(payment.created_utc)
        .bind(payment.cancelled_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();

        info!(
            payment_id = %created.payment_id,
            receipt_number = %created.receipt_number,
            amount = %created.amount,
            "Payment persisted"
        );

        Ok(created)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self, reason), fields(payment_id = %payment_id))]
    async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = 'cancelled', cancel_reason = $2, cancelled_utc = NOW() \
             WHERE payment_id = $1 AND status = 'confirmed' \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to cancel payment: {}", e)))?;

        timer.observe_duration();

        if let Some(ref p) = payment {
            info!(payment_id = %p.payment_id, "Payment cancelled");
        }

        Ok(payment)
    }

    #[instrument(skip(self, debt), fields(debt_id = %debt.debt_id))]
    async fn create_debt(&self, debt: &Debt) -> Result<Debt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_debt"])
            .start_timer();

        let created = sqlx::query_as::<_, Debt>(&format!(
            "INSERT INTO debts ({DEBT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {DEBT_COLUMNS}"
        ))
        .bind(debt.debt_id)
        .bind(debt.customer_id)
        .bind(&debt.debt_type)
        .bind(debt.original_amount)
        .bind(debt.penalty_amount)
        .bind(debt.paid_amount)
        .bind(debt.remaining_amount)
        .bind(&debt.status)
        .bind(debt.due_date)
        .bind(&debt.notes)
        .bind(debt.is_deleted)
        .bind(debt.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create debt: {}", e)))?;

        timer.observe_duration();

        info!(debt_id = %created.debt_id, debt_type = %created.debt_type, "Debt recorded");

        Ok(created)
    }

    #[instrument(skip(self), fields(debt_id = %debt_id))]
    async fn get_debt(&self, debt_id: Uuid) -> Result<Option<Debt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_debt"])
            .start_timer();

        let debt = sqlx::query_as::<_, Debt>(&format!(
            "SELECT {DEBT_COLUMNS} FROM debts WHERE debt_id = $1 AND is_deleted = FALSE"
        ))
        .bind(debt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get debt: {}", e)))?;

        timer.observe_duration();

        Ok(debt)
    }

    #[instrument(skip(self), fields(debt_id = %debt_id))]
    async fn update_debt_payment(
        &self,
        debt_id: Uuid,
        paid_amount: Decimal,
        remaining_amount: Decimal,
        status: &str,
    ) -> Result<Option<Debt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_debt_payment"])
            .start_timer();

        let debt = sqlx::query_as::<_, Debt>(&format!(
            "UPDATE debts \
             SET paid_amount = $2, remaining_amount = $3, status = $4 \
             WHERE debt_id = $1 AND is_deleted = FALSE \
             RETURNING {DEBT_COLUMNS}"
        ))
        .bind(debt_id)
        .bind(paid_amount)
        .bind(remaining_amount)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update debt: {}", e)))?;

        timer.observe_duration();

        Ok(debt)
    }

    #[instrument(skip(self, notes), fields(debt_id = %debt_id))]
    async fn write_off_debt(&self, debt_id: Uuid, notes: &str) -> Result<Option<Debt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["write_off_debt"])
            .start_timer();

        let debt = sqlx::query_as::<_, Debt>(&format!(
            "UPDATE debts \
             SET status = 'written_off', \
                 notes = CASE WHEN notes IS NULL THEN $2 ELSE notes || '; ' || $2 END \
             WHERE debt_id = $1 AND is_deleted = FALSE \
             RETURNING {DEBT_COLUMNS}"
        ))
        .bind(debt_id)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to write off debt: {}", e)))?;

        timer.observe_duration();

        if let Some(ref d) = debt {
            info!(debt_id = %d.debt_id, "Debt written off");
        }

        Ok(debt)
    }

    #[instrument(skip(self))]
    async fn list_open_debts(&self) -> Result<Vec<Debt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_open_debts"])
            .start_timer();

        let debts = sqlx::query_as::<_, Debt>(&format!(
            "SELECT {DEBT_COLUMNS} FROM debts \
             WHERE is_deleted = FALSE AND status IN ('outstanding', 'partial') \
             ORDER BY created_utc"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list open debts: {}", e)))?;

        timer.observe_duration();

        Ok(debts)
    }

    #[instrument(skip(self, entry, lines), fields(entry_no = %entry.entry_no))]
    async fn create_journal_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<JournalEntry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_journal_entry"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin tx: {}", e)))?;

        let created = sqlx::query_as::<_, JournalEntry>(&format!(
            "INSERT INTO journal_entries ({JOURNAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {JOURNAL_COLUMNS}"
        ))
        .bind(entry.journal_id)
        .bind(&entry.entry_no)
        .bind(entry.entry_date)
        .bind(&entry.entry_type)
        .bind(&entry.reference_type)
        .bind(entry.reference_id)
        .bind(&entry.reference_no)
        .bind(entry.total_debit)
        .bind(entry.total_credit)
        .bind(&entry.status)
        .bind(entry.created_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Journal entry '{}' already exists",
                    entry.entry_no
                ))
            }
            _ => AppError::Database(anyhow::anyhow!("Failed to create journal entry: {}", e)),
        })?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (line_id, journal_id, account_code, debit, credit, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.line_id)
            .bind(line.journal_id)
            .bind(&line.account_code)
            .bind(line.debit)
            .bind(line.credit)
            .bind(line.sort_order)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to insert line: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit entry: {}", e)))?;

        timer.observe_duration();

        info!(
            entry_no = %created.entry_no,
            entry_type = %created.entry_type,
            total_debit = %created.total_debit,
            "Journal entry posted"
        );

        Ok(created)
    }

    #[instrument(skip(self), fields(journal_id = %journal_id))]
    async fn get_journal_entry(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_journal_entry"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            "SELECT {JOURNAL_COLUMNS} FROM journal_entries WHERE journal_id = $1"
        ))
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get journal entry: {}", e)))?;

        timer.observe_duration();

        Ok(entry)
    }

    #[instrument(skip(self), fields(journal_id = %journal_id))]
    async fn get_journal_lines(&self, journal_id: Uuid) -> Result<Vec<JournalLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_journal_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, JournalLine>(
            r#"
            SELECT line_id, journal_id, account_code, debit, credit, sort_order
            FROM journal_lines
            WHERE journal_id = $1
            ORDER BY sort_order
            "#,
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get journal lines: {}", e)))?;

        timer.observe_duration();

        Ok(lines)
    }

    #[instrument(skip(self), fields(reference_type = %reference_type, reference_id = %reference_id))]
    async fn find_journal_for_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_journal_for_reference"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            "SELECT {JOURNAL_COLUMNS} FROM journal_entries \
             WHERE reference_type = $1 AND reference_id = $2 AND status = 'posted' \
             ORDER BY created_utc DESC \
             LIMIT 1"
        ))
        .bind(reference_type)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to find journal entry: {}", e))
        })?;

        timer.observe_duration();

        Ok(entry)
    }

    #[instrument(skip(self), fields(journal_id = %journal_id))]
    async fn mark_journal_reversed(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_journal_reversed"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            "UPDATE journal_entries \
             SET status = 'reversed' \
             WHERE journal_id = $1 AND status = 'posted' \
             RETURNING {JOURNAL_COLUMNS}"
        ))
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to reverse entry: {}", e)))?;

        timer.observe_duration();

        Ok(entry)
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn next_sequence(&self, scope: &str) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_sequence"])
            .start_timer();

        // Database-enforced monotonic counter per scope; no collisions
        // under concurrent numbering.
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (scope, value)
            VALUES ($1, 1)
            ON CONFLICT (scope) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(scope)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to advance sequence: {}", e)))?;

        timer.observe_duration();

        Ok(value)
    }
}
