//! Talks to the calc module started by the `calc_module` example.

use modwire::logging::{self, LogOptions};
use modwire::{args, Context, MultiTarget, Outcome, RemoteProxy, RpcError, Socket};
use std::time::Duration;

#[tokio::main]
async fn main() -> modwire::Result<()> {
    logging::init(LogOptions::default());

    let ctx = Context::from_env()?;
    let calc = RemoteProxy::connect(&ctx, "calc");

    let sum: f64 = calc.call("add", args![10, 20]).await?.into_value()?;
    println!("add(10, 20) = {}", sum);

    let square: f64 = calc
        .call("slow_square", args![; x = 7])
        .await?
        .into_value()?;
    println!("slow_square(x=7) = {}", square);

    // Methods come back as handles; invoking one resends the lookup.
    let add = calc.get("add").await?.into_handle();
    if let Some(add) = add {
        println!("{} -> {}", add, add.invoke(args![1, 2]).await?);
    }

    calc.set("precision", 4).await?;
    println!("precision = {}", calc.get("precision").await?);

    match calc.call("div", args![1, 0]).await {
        Err(RpcError::Remote(e)) => println!("div(1, 0) failed: {}", e),
        other => println!("div(1, 0) = {:?}", other),
    }

    // Chain without checking each step; the first failure sticks.
    let entry = Outcome::from(calc.clone())
        .get("memory")
        .await
        .call("store", args![42])
        .await;
    println!("memory.store(42) -> {}", entry);
    let missing = Outcome::from(calc.clone())
        .get("no_such_child")
        .await
        .call("store", args![1])
        .await;
    println!("no_such_child.store(1) -> {} (truthy: {})", missing, missing.is_truthy());

    println!("dir(calc) = {:?}", calc.directory().await?);

    let everyone = MultiTarget::new(&ctx, "*")?;
    print!("{}", everyone.get("precision").await);

    let mut updates = Socket::subscriber(&ctx, "calc", "memory");
    match tokio::time::timeout(Duration::from_secs(3), updates.recv()).await {
        Ok(Ok((topic, value))) => println!("[{}] {}", topic, value),
        Ok(Err(e)) => println!("subscription failed: {}", e),
        Err(_) => println!("no publication within 3s"),
    }
    Ok(())
}
