use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use posflow::application::calculator::{ChargeSelection, compute_charge, parse_manual_amount};
use posflow::application::orchestrator::{
    ChargeMode, ChargeRequest, OrchestratorConfig, PaymentOrchestrator,
};
use posflow::domain::money::MinorUnits;
use posflow::domain::order::{DeviceChargeSnapshot, OrderSnapshot};
use posflow::domain::ports::{PaymentLinkAdmin, PaymentTransportRef, TerminalDirectory};
use posflow::domain::remote::{PosTerminal, pending_link_total};
use posflow::domain::terminal::{TerminalChoice, select_default_terminal};
use posflow::infrastructure::http::HttpTransport;
use posflow::infrastructure::in_memory::InMemoryOrderStore;
use posflow::infrastructure::simulated::SimulatedTransport;
use posflow::interfaces::csv::device_reader::DeviceReader;
use posflow::interfaces::csv::quote_writer::QuoteWriter;
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posflow", author, version, about, long_about = None)]
struct Cli {
    /// Allow deposits on repairs that are not yet complete
    #[arg(long, global = true)]
    deposits: bool,

    #[arg(long, global = true, default_value = "GBP")]
    currency: String,

    /// Delay between status polls, in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Give up on a terminal payment after this many seconds (at most one day)
    #[arg(
        long,
        global = true,
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..=86_400)
    )]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price a charge without contacting the backend
    Quote(OrderArgs),
    /// Take a card payment on a terminal
    Charge {
        #[command(flatten)]
        order: OrderArgs,
        #[command(flatten)]
        backend: BackendArgs,
        /// Terminal to use; defaults to the only active one or `--last-terminal`
        #[arg(long)]
        terminal: Option<String>,
        /// Terminal used last time, preferred when several are active
        #[arg(long)]
        last_terminal: Option<String>,
    },
    /// Create a payment link
    Link {
        #[command(flatten)]
        order: OrderArgs,
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List card terminals
    Terminals {
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long)]
        location: Option<String>,
    },
    /// List, cancel or resend the payment links of an order
    Links {
        order_id: String,
        #[command(flatten)]
        backend: BackendArgs,
        /// Cancel this pending link before listing
        #[arg(long)]
        cancel: Option<String>,
        /// Resend the email for this link before listing
        #[arg(long)]
        resend: Option<String>,
    },
}

#[derive(Args)]
struct OrderArgs {
    /// Device CSV: device_id, name, workflow, status, gross_total, already_paid
    devices: PathBuf,

    #[arg(long, default_value = "order")]
    order_id: String,

    #[arg(long)]
    order_number: Option<u32>,

    /// Outstanding order balance; defaults to the sum of what each device still owes
    #[arg(long)]
    balance: Option<String>,

    /// Comma-separated device ids to charge; omit to charge the whole balance
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Manual amount, overriding the computed one
    #[arg(long)]
    amount: Option<String>,

    #[arg(long)]
    customer_email: Option<String>,
}

#[derive(Args)]
struct BackendArgs {
    #[arg(long, env = "POSFLOW_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "POSFLOW_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Use an in-process backend that approves every card
    #[arg(long)]
    simulate: bool,
}

struct Backend {
    transport: PaymentTransportRef,
    terminals: Arc<dyn TerminalDirectory>,
    links: Arc<dyn PaymentLinkAdmin>,
}

impl BackendArgs {
    fn connect(self) -> Result<Backend> {
        if self.simulate {
            let simulated = SimulatedTransport::approving_after(2);
            simulated.add_terminal(PosTerminal {
                id: "sim_terminal".to_string(),
                integration_id: None,
                provider_terminal_id: None,
                display_name: "Simulated counter terminal".to_string(),
                provider: "simulated".to_string(),
                is_active: Some(true),
            });
            return Ok(Backend {
                transport: Arc::new(simulated.clone()),
                terminals: Arc::new(simulated.clone()),
                links: Arc::new(simulated),
            });
        }

        let api_url = self
            .api_url
            .ok_or_else(|| miette!("Set --api-url (or POSFLOW_API_URL), or pass --simulate"))?;
        let http = HttpTransport::new(api_url, self.api_token).into_diagnostic()?;
        Ok(Backend {
            transport: Arc::new(http.clone()),
            terminals: Arc::new(http.clone()),
            links: Arc::new(http),
        })
    }
}

impl OrderArgs {
    fn load_order(&self) -> Result<OrderSnapshot> {
        let file = File::open(&self.devices).into_diagnostic()?;
        let devices = DeviceReader::new(file)
            .devices()
            .collect::<posflow::error::Result<Vec<DeviceChargeSnapshot>>>()
            .into_diagnostic()?;

        let balance_due = match &self.balance {
            Some(text) => parse_major(text)?,
            None => devices.iter().map(DeviceChargeSnapshot::chargeable).sum(),
        };

        let mut order =
            OrderSnapshot::new(self.order_id.clone(), balance_due).with_devices(devices);
        order.order_number = self.order_number;
        order.customer_email = self.customer_email.clone();
        Ok(order)
    }

    fn selection(&self) -> Result<ChargeSelection> {
        let manual_amount = match &self.amount {
            Some(text) => Some(
                parse_manual_amount(text)
                    .ok_or_else(|| miette!("Invalid amount: {text}"))?,
            ),
            None => None,
        };
        Ok(ChargeSelection::devices(self.select.iter().cloned()).with_manual_amount(manual_amount))
    }
}

fn parse_major(text: &str) -> Result<MinorUnits> {
    let major: Decimal = text
        .trim()
        .parse()
        .map_err(|_| miette!("Invalid amount: {text}"))?;
    MinorUnits::from_major(major).into_diagnostic()
}

async fn choose_terminal(
    backend: &Backend,
    requested: Option<String>,
    last_terminal: Option<&str>,
) -> Result<String> {
    if let Some(terminal) = requested {
        return Ok(terminal);
    }
    let terminals = backend.terminals.list_terminals(None).await.into_diagnostic()?;
    match select_default_terminal(&terminals, last_terminal) {
        TerminalChoice::Terminal(id) => Ok(id),
        TerminalChoice::LinkOnly => Err(miette!(
            "No active card terminal; use `posflow link` to send a payment link"
        )),
        TerminalChoice::Unselected => {
            let ids: Vec<&str> = terminals
                .iter()
                .filter(|t| t.is_active())
                .map(|t| t.id.as_str())
                .collect();
            Err(miette!(
                "Several terminals are active, pick one with --terminal: {}",
                ids.join(", ")
            ))
        }
    }
}

async fn run_attempt(
    config: OrchestratorConfig,
    backend: Backend,
    order: OrderSnapshot,
    request: ChargeRequest,
) -> Result<()> {
    let store = InMemoryOrderStore::new();
    store.insert(order.clone()).await;
    let orchestrator = PaymentOrchestrator::new(backend.transport, Arc::new(store), config)
        .with_link_admin(backend.links);

    let handle = orchestrator.create_attempt(&order, request).into_diagnostic()?;
    let canceller = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling payment");
            canceller.cancel().await;
        }
    });

    let resolution = handle.initiate().await.into_diagnostic()?;
    info!("{}", resolution.user_message());

    let stdout = io::stdout();
    let mut writer = QuoteWriter::new(stdout.lock());
    writer
        .write_outcome(&handle.snapshot(), &resolution)
        .into_diagnostic()?;

    if let Some(terminal) = orchestrator.last_terminal_id() {
        info!(%terminal, "Last terminal used");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let config = OrchestratorConfig::default()
        .with_poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_currency(cli.currency)
        .with_deposits_enabled(cli.deposits);

    let stdout = io::stdout();
    match cli.command {
        Command::Quote(order_args) => {
            let order = order_args.load_order()?;
            let selection = order_args.selection()?;
            let quote =
                compute_charge(&order, &selection, config.deposits_enabled).into_diagnostic()?;
            if quote.exceeds_balance {
                warn!(balance = %order.balance_due, "Amount exceeds the outstanding balance");
            }
            QuoteWriter::new(stdout.lock())
                .write_quote(&order.id, &quote)
                .into_diagnostic()?;
        }
        Command::Charge {
            order,
            backend,
            terminal,
            last_terminal,
        } => {
            let snapshot = order.load_order()?;
            let selection = order.selection()?;
            let backend = backend.connect()?;
            let terminal_id = choose_terminal(&backend, terminal, last_terminal.as_deref()).await?;
            let config = config.with_last_terminal(last_terminal);
            run_attempt(
                config,
                backend,
                snapshot,
                ChargeRequest::terminal(terminal_id, selection),
            )
            .await?;
        }
        Command::Link {
            order,
            backend,
            email,
            description,
        } => {
            let snapshot = order.load_order()?;
            let request = ChargeRequest {
                mode: ChargeMode::Link {
                    customer_email: email,
                    description,
                },
                selection: order.selection()?,
            };
            run_attempt(config, backend.connect()?, snapshot, request).await?;
        }
        Command::Terminals { backend, location } => {
            let backend = backend.connect()?;
            let terminals = backend
                .terminals
                .list_terminals(location.as_deref())
                .await
                .into_diagnostic()?;
            QuoteWriter::new(stdout.lock())
                .write_rows(&terminals)
                .into_diagnostic()?;
        }
        Command::Links {
            order_id,
            backend,
            cancel,
            resend,
        } => {
            let backend = backend.connect()?;
            if let Some(link_id) = cancel {
                backend.links.cancel_link(&link_id).await.into_diagnostic()?;
                info!(%link_id, "Payment link cancelled");
            }
            if let Some(link_id) = resend {
                backend
                    .links
                    .resend_link_email(&link_id)
                    .await
                    .into_diagnostic()?;
                info!(%link_id, "Payment link email resent");
            }
            let links = backend.links.list_links(&order_id).await.into_diagnostic()?;
            info!(pending = %pending_link_total(&links), "Outstanding payment links");
            QuoteWriter::new(stdout.lock())
                .write_rows(&links)
                .into_diagnostic()?;
        }
    }

    Ok(())
}
