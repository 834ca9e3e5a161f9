//! Operator console
//!
//! Line-oriented menu that drives the order gateway. Every command reads its
//! arguments one line at a time; failures are printed and the menu comes back.

use std::io;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::RelayError;
use relay_order_gateway::{OpenOrder, OrderAction, OrderGateway, OrderSelector, OrderTicket, OrderType};
use relay_subscription::SubscriptionBridge;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const MENU: &str = "\n1. Place order\n2. Cancel order\n3. Modify order\n4. Order book\n5. Positions\n6. Subscribed channels\n7. Exit";

const DEFAULT_INSTRUMENT: &str = "BTC-PERPETUAL";
const DEFAULT_DEPTH: u32 = 5;

#[derive(Debug, Error)]
enum CommandError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Relay(#[from] RelayError),

    #[error("Invalid input: {0}")]
    Input(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Place,
    Cancel,
    Modify,
    OrderBook,
    Positions,
    Channels,
    Exit,
}

impl Command {
    pub fn parse(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(Self::Place),
            "2" => Some(Self::Cancel),
            "3" => Some(Self::Modify),
            "4" => Some(Self::OrderBook),
            "5" => Some(Self::Positions),
            "6" => Some(Self::Channels),
            "7" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Question/answer over any async line source and sink
pub struct Prompt<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> Prompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub async fn say(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Print `question` and read one trimmed line; end of input is `UnexpectedEof`
    pub async fn ask(&mut self, question: &str) -> io::Result<String> {
        self.writer.write_all(question.as_bytes()).await?;
        self.writer.write_all(b": ").await?;
        self.writer.flush().await?;

        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Numbered open-order picker; `0` or anything unparsable aborts
pub struct ConsoleSelector<'a, R, W> {
    prompt: &'a Mutex<Prompt<R, W>>,
}

impl<'a, R, W> ConsoleSelector<'a, R, W> {
    pub fn new(prompt: &'a Mutex<Prompt<R, W>>) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl<R, W> OrderSelector for ConsoleSelector<'_, R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn select(&self, orders: &[OpenOrder]) -> Option<String> {
        let mut prompt = self.prompt.lock().await;
        match choose(&mut prompt, orders).await {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "Order selection failed");
                None
            }
        }
    }
}

async fn choose<R, W>(prompt: &mut Prompt<R, W>, orders: &[OpenOrder]) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    prompt.say("Open orders:").await?;
    for (i, order) in orders.iter().enumerate() {
        prompt.say(&format!("{}. {}", i + 1, describe_order(order))).await?;
    }

    let answer = prompt.ask("Select order (0 to abort)").await?;
    let choice = match answer.parse::<usize>() {
        Ok(n) if n >= 1 => orders.get(n - 1).map(|order| order.order_id.clone()),
        _ => None,
    };
    if choice.is_none() {
        prompt.say("Aborted").await?;
    }
    Ok(choice)
}

fn describe_order(order: &OpenOrder) -> String {
    let price = order
        .price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "market".to_string());
    let amount = order.amount.map(|a| a.to_string()).unwrap_or_default();
    format!(
        "{} {} amount {} price {}",
        order.order_id, order.instrument_name, amount, price
    )
}

pub struct Console<R, W> {
    gateway: Arc<OrderGateway>,
    bridge: Arc<SubscriptionBridge>,
    prompt: Mutex<Prompt<R, W>>,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(gateway: Arc<OrderGateway>, bridge: Arc<SubscriptionBridge>, prompt: Prompt<R, W>) -> Self {
        Self {
            gateway,
            bridge,
            prompt: Mutex::new(prompt),
        }
    }

    /// Run the menu until `Exit` or end of input
    pub async fn run(&self) -> io::Result<()> {
        loop {
            let choice = {
                let mut prompt = self.prompt.lock().await;
                prompt.say(MENU).await?;
                match prompt.ask("Choose an option").await {
                    Ok(choice) => choice,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e),
                }
            };

            let Some(command) = Command::parse(&choice) else {
                self.say(&format!("Invalid option '{}'", choice)).await?;
                continue;
            };
            if command == Command::Exit {
                break;
            }

            match self.execute(command).await {
                Ok(()) => {}
                Err(CommandError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(CommandError::Io(e)) => return Err(e),
                Err(e) => self.say(&format!("Error: {}", e)).await?,
            }
        }
        tracing::info!("Console closed");
        Ok(())
    }

    pub fn into_prompt(self) -> Prompt<R, W> {
        self.prompt.into_inner()
    }

    async fn execute(&self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Place => self.place().await,
            Command::Cancel => self.cancel().await,
            Command::Modify => self.modify().await,
            Command::OrderBook => self.order_book().await,
            Command::Positions => self.positions().await,
            Command::Channels => self.channels().await,
            Command::Exit => Ok(()),
        }
    }

    async fn place(&self) -> Result<(), CommandError> {
        let ticket = {
            let mut prompt = self.prompt.lock().await;
            let instrument = or_default(prompt.ask("Instrument [BTC-PERPETUAL]").await?, DEFAULT_INSTRUMENT);
            let amount = parse_decimal(&prompt.ask("Amount").await?)?;
            let order_type = OrderType::parse(&prompt.ask("Type (market/limit)").await?)
                .ok_or_else(|| CommandError::Input("type must be market or limit".to_string()))?;
            let ticket = match order_type {
                OrderType::Market => OrderTicket::market(instrument, amount),
                OrderType::Limit => {
                    let price = parse_decimal(&prompt.ask("Price").await?)?;
                    OrderTicket::limit(instrument, amount, price)
                }
            };
            ticket.with_label(prompt.ask("Label").await?)
        };

        let placed = self.gateway.place(&ticket).await?;
        self.say(&format!("Order placed: {}", placed.order_id)).await?;
        Ok(())
    }

    async fn cancel(&self) -> Result<(), CommandError> {
        let selector = ConsoleSelector::new(&self.prompt);
        match self.gateway.cancel(&selector).await? {
            OrderAction::Completed(_) => self.say("Order cancelled").await?,
            OrderAction::Aborted => {}
        }
        Ok(())
    }

    async fn modify(&self) -> Result<(), CommandError> {
        let (amount, price) = {
            let mut prompt = self.prompt.lock().await;
            let amount = optional_decimal(&prompt.ask("New amount (blank to keep)").await?)?;
            let price = optional_decimal(&prompt.ask("New price (blank to keep)").await?)?;
            (amount, price)
        };

        let selector = ConsoleSelector::new(&self.prompt);
        match self.gateway.modify(&selector, amount, price).await? {
            OrderAction::Completed(_) => self.say("Order modified").await?,
            OrderAction::Aborted => {}
        }
        Ok(())
    }

    async fn order_book(&self) -> Result<(), CommandError> {
        let (instrument, depth) = {
            let mut prompt = self.prompt.lock().await;
            let instrument = or_default(prompt.ask("Instrument [BTC-PERPETUAL]").await?, DEFAULT_INSTRUMENT);
            let depth = prompt.ask("Depth [5]").await?;
            let depth = if depth.is_empty() {
                DEFAULT_DEPTH
            } else {
                depth
                    .parse()
                    .map_err(|_| CommandError::Input(format!("'{}' is not a depth", depth)))?
            };
            (instrument, depth)
        };

        let book = self.gateway.query_order_book(&instrument, depth).await?;
        let mut prompt = self.prompt.lock().await;
        prompt.say(&format!("Order book {}", book.instrument_name)).await?;
        prompt.say("  Bids:").await?;
        for level in &book.bids {
            prompt.say(&format!("    {} @ {}", level.amount(), level.price())).await?;
        }
        prompt.say("  Asks:").await?;
        for level in &book.asks {
            prompt.say(&format!("    {} @ {}", level.amount(), level.price())).await?;
        }
        Ok(())
    }

    async fn positions(&self) -> Result<(), CommandError> {
        let (currency, kind) = {
            let mut prompt = self.prompt.lock().await;
            let currency = or_default(prompt.ask("Currency [BTC]").await?, "BTC");
            let kind = or_default(prompt.ask("Kind [future]").await?, "future");
            (currency, kind)
        };

        let positions = self.gateway.query_positions(&currency, &kind).await?;
        let mut prompt = self.prompt.lock().await;
        if positions.is_empty() {
            prompt.say("No positions").await?;
        }
        for position in &positions {
            prompt
                .say(&format!(
                    "{} size {} {}",
                    position.instrument_name,
                    position.size.map(|s| s.to_string()).unwrap_or_default(),
                    position.direction.as_deref().unwrap_or("")
                ))
                .await?;
        }
        Ok(())
    }

    async fn channels(&self) -> Result<(), CommandError> {
        let channels = self.bridge.subscribed_channels();
        let mut prompt = self.prompt.lock().await;
        if channels.is_empty() {
            prompt.say("No subscribed channels").await?;
        }
        for channel in &channels {
            prompt.say(channel.as_str()).await?;
        }
        Ok(())
    }

    async fn say(&self, text: &str) -> io::Result<()> {
        self.prompt.lock().await.say(text).await
    }
}

fn or_default(answer: String, default: &str) -> String {
    if answer.is_empty() {
        default.to_string()
    } else {
        answer
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, CommandError> {
    Decimal::from_str(text).map_err(|_| CommandError::Input(format!("'{}' is not a number", text)))
}

fn optional_decimal(text: &str) -> Result<Option<Decimal>, CommandError> {
    if text.is_empty() {
        Ok(None)
    } else {
        parse_decimal(text).map(Some)
    }
}
