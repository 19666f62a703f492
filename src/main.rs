use anyhow::Context;
use tracing::{info, Instrument};

use storefront_gateway::{setup_tracing, StoreSystem};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("Starting storefront gateway demo");

    let system = StoreSystem::from_env().context("failed to start the store system")?;
    let gateway = &system.gateway;

    let seeded = gateway
        .execute(
            r#"mutation Seed {
                alice: createAccount(name: "Alice") { id name }
                mug: createProduct(name: "Mug", description: "Stoneware, 350ml", price: "10.00") { id price }
                tea: createProduct(name: "Tea", description: "Loose leaf, 100g", price: "5.00") { id price }
            }"#,
        )
        .instrument(tracing::info_span!("seed"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&seeded)?);

    let account_id = seeded
        .pointer("alice.id")
        .and_then(|id| id.as_str())
        .context("seed mutation returned no account id")?;
    let mug_id = seeded
        .pointer("mug.id")
        .and_then(|id| id.as_str())
        .context("seed mutation returned no product id")?;
    let tea_id = seeded
        .pointer("tea.id")
        .and_then(|id| id.as_str())
        .context("seed mutation returned no product id")?;

    let order = gateway
        .execute(&format!(
            r#"mutation {{
                createOrder(accountId: "{account_id}", products: [{{id: "{mug_id}", quantity: 2}}, {{id: "{tea_id}", quantity: 1}}]) {{
                    id totalPrice products {{ name price quantity }}
                }}
            }}"#
        ))
        .instrument(tracing::info_span!("order_processing"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&order)?);

    let overview = gateway
        .execute(
            r#"query Overview {
                accounts { id name orders { id createdAt totalPrice products { id name price quantity } } }
                products(query: "leaf") { id name price }
            }"#,
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&overview)?);

    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
