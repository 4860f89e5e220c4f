//! Customer commands - stage contacts and send them review requests

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Subcommand};
use reviewdesk_core::{Config, Customer, CustomerId, NewCustomer, OwnerId};

use super::context::{format_age, open_database, require_owner};

/// Staged customer commands
#[derive(Args, Debug)]
pub struct CustomerArgs {
    #[command(subcommand)]
    pub command: CustomerCommand,
}

#[derive(Subcommand, Debug)]
pub enum CustomerCommand {
    /// Stage a customer to send a request to later
    Add {
        /// Customer name
        #[arg(short, long)]
        name: String,

        /// Customer phone number, digits only
        #[arg(short, long)]
        phone: String,

        /// Custom message; a default greeting is used when omitted
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List staged customers, newest first
    List,

    /// Send a review request to a staged customer and unstage them
    Send {
        /// Customer id
        id: String,
    },
}

impl CustomerArgs {
    /// Execute the customer command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let owner = require_owner(config)?;
        match &self.command {
            CustomerCommand::Add {
                name,
                phone,
                message,
            } => {
                let customer = new_customer(owner, name, phone, message.as_deref());
                add_customer(&customer, verbose, config).await
            }
            CustomerCommand::List => list_customers(&owner, config).await,
            CustomerCommand::Send { id } => {
                send_customer(&CustomerId::from(id.as_str()), &owner, verbose, config).await
            }
        }
    }
}

fn new_customer(owner: OwnerId, name: &str, phone: &str, message: Option<&str>) -> NewCustomer {
    let customer = NewCustomer::new(owner, name.trim(), phone.trim());
    match message {
        Some(message) => customer.with_message(message.trim()),
        None => customer,
    }
}

async fn add_customer(customer: &NewCustomer, verbose: bool, config: &Config) -> anyhow::Result<()> {
    customer.validate().context("Invalid customer")?;

    let db = open_database(config).await?;
    let created = db.customers().create(customer).await;
    db.close().await;
    let created = created.context("Failed to stage customer")?;

    println!("Staged customer {}", created.id);
    println!("  {} ({})", created.name, created.phone);
    if verbose {
        tracing::info!(id = %created.id, owner = %created.owner_id, "Customer stored");
    }
    Ok(())
}

async fn list_customers(owner: &OwnerId, config: &Config) -> anyhow::Result<()> {
    let db = open_database(config).await?;
    let customers = db.customers().list_by_owner(owner).await;
    db.close().await;
    let customers = customers.context("Failed to load customers")?;

    println!();
    println!("Customers:");
    println!();
    if customers.is_empty() {
        println!("  No customers waiting.");
    } else {
        let now = Utc::now();
        for customer in &customers {
            println!("  {}", format_customer(customer, now));
        }
    }
    println!();
    Ok(())
}

async fn send_customer(
    id: &CustomerId,
    owner: &OwnerId,
    verbose: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let db = open_database(config).await?;
    let sent = db.customers().send(id, owner).await;
    db.close().await;

    match sent.context("Failed to send review request")? {
        Some(request) => {
            println!("Sent review request {}", request.id);
            println!("  To: {} ({})", request.name, request.phone);
            println!("  Message: {}", request.message);
            if verbose {
                tracing::info!(customer = %id, request = %request.id, "Customer unstaged");
            }
            Ok(())
        }
        None => anyhow::bail!("No customer {} found for {}", id, owner),
    }
}

fn format_customer(customer: &Customer, now: chrono::DateTime<Utc>) -> String {
    format!(
        "{:<36}  {:<20}  {:<15}  {} ago",
        customer.id.as_str(),
        customer.name,
        customer.phone,
        format_age((now - customer.created_at).num_seconds())
    )
}
