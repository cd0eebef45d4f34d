//! `Human` record contract shared by the end-to-end tests

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use wirecall_schema::{Describe, Error, FromValue, IntoValue, Kind, Record, Schema, Shape, Value};
use wirecall_transport::{Context, HandlerError, HandlerTable, Method};

/// Application error code returned by `AddHuman` for humans without an identifier
pub const MISSING_ID: i32 = 42;

/// Identifier `GetHumanById` resolves from the seeded store
pub const KNOWN_ID: i32 = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Human {
    pub id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub age: u8,
}

impl Human {
    #[must_use]
    pub fn kobzon() -> Self {
        Self {
            id: Some(KNOWN_ID),
            first_name: "Josef".into(),
            last_name: "Kobzon".into(),
            age: 80,
        }
    }
}

impl Describe for Human {
    fn shape() -> Shape {
        Shape::Record(vec![
            ("Id".into(), Option::<i32>::shape()),
            ("FirstName".into(), String::shape()),
            ("LastName".into(), String::shape()),
            ("Age".into(), u8::shape()),
        ])
    }
}

impl IntoValue for Human {
    fn into_value(self) -> Value {
        Record::new()
            .with("Id", self.id)
            .with("FirstName", self.first_name)
            .with("LastName", self.last_name)
            .with("Age", self.age)
            .into_value()
    }
}

impl FromValue for Human {
    fn from_value(value: Value) -> Result<Self, Error> {
        let mut record = Record::from_value(value)?;
        Ok(Self {
            id: record.take("Id")?,
            first_name: record.take("FirstName")?,
            last_name: record.take("LastName")?,
            age: record.take("Age")?,
        })
    }
}

/// Methods served by the test server
#[derive(Clone, Debug)]
pub struct Methods {
    /// `GetHumanById(int32) -> Human`
    pub get_human_by_id: Method,
    /// `AddHuman(Human) -> int32`, fails with [`MISSING_ID`] for humans without an identifier
    pub add_human: Method,
    /// `CountHumans() -> int32`
    pub count_humans: Method,
    /// `Explode()`, always fails with a non-application error
    pub explode: Method,
    /// `GreetBack(string) -> string`, forwards to `Greet` on the caller's callback stream
    pub greet_back: Method,
    /// `Wait()`, blocks until `Release` is called on any connection
    pub wait: Method,
    /// `Release()`, unblocks one pending or future `Wait`
    pub release: Method,
}

impl Methods {
    pub fn new() -> anyhow::Result<Self> {
        let human = Human::schema().context("failed to build `Human` schema")?;
        let int32 = Schema::Primitive(Kind::I32);
        let string = Schema::Primitive(Kind::String);
        Ok(Self {
            get_human_by_id: Method::new("GetHumanById", [int32.clone()], Some(human.clone()))?,
            add_human: Method::new("AddHuman", [human], Some(int32.clone()))?,
            count_humans: Method::new("CountHumans", [], Some(int32))?,
            explode: Method::new("Explode", [], None)?,
            greet_back: Method::new("GreetBack", [string.clone()], Some(string))?,
            wait: Method::new("Wait", [], None)?,
            release: Method::new("Release", [], None)?,
        })
    }
}

/// `Greet(string) -> string`, served by clients on their callback stream
pub fn greet() -> anyhow::Result<Method> {
    let string = Schema::Primitive(Kind::String);
    Ok(Method::new("Greet", [string.clone()], Some(string))?)
}

type Store = Arc<Mutex<HashMap<i32, Human>>>;

fn arg<T: FromValue>(args: &mut std::vec::IntoIter<Value>) -> Result<T, HandlerError> {
    let value = args.next().ok_or_else(|| anyhow!("missing argument"))?;
    Ok(T::from_value(value)?)
}

async fn get_human_by_id(store: Store, args: Vec<Value>) -> Result<Value, HandlerError> {
    let id: i32 = arg(&mut args.into_iter())?;
    let human = store.lock().await.get(&id).cloned();
    debug!(id, found = human.is_some(), "looked up human");
    Ok(human.into_value())
}

async fn add_human(store: Store, args: Vec<Value>) -> Result<Value, HandlerError> {
    let human: Human = arg(&mut args.into_iter())?;
    let Some(id) = human.id else {
        return Err(HandlerError::Application(MISSING_ID));
    };
    store.lock().await.insert(id, human);
    Ok(Value::I32(id))
}

async fn count_humans(store: Store) -> Result<Value, HandlerError> {
    let n = store.lock().await.len();
    let n = i32::try_from(n).map_err(HandlerError::other)?;
    Ok(Value::I32(n))
}

async fn explode() -> Result<Value, HandlerError> {
    Err(HandlerError::Other(anyhow!("boom")))
}

async fn wait(gate: Arc<Notify>) -> Result<Value, HandlerError> {
    gate.notified().await;
    debug!("released");
    Ok(Value::Null)
}

async fn release(gate: Arc<Notify>) -> Result<Value, HandlerError> {
    // a stored permit releases a `Wait` that has not arrived yet
    gate.notify_one();
    Ok(Value::Null)
}

async fn greet_back(cx: Context, greet: Arc<Method>, args: Vec<Value>) -> Result<Value, HandlerError> {
    let name: String = arg(&mut args.into_iter())?;
    let Some(callback) = cx.callback() else {
        return Err(anyhow!("connection `{}` has no callback stream", cx.id()).into());
    };
    let greeting: String = callback
        .call(&greet, &[Value::String(name)])
        .await
        .context("failed to call back")?;
    Ok(Value::String(greeting))
}

async fn greet_callback(cx: Context, args: Vec<Value>) -> Result<Value, HandlerError> {
    let name: String = arg(&mut args.into_iter())?;
    if name.is_empty() {
        return Err(anyhow!("empty name").into());
    }
    Ok(Value::String(format!(
        "hello {name} from connection {}",
        cx.id()
    )))
}

/// Handlers of [Methods], backed by a store seeded with [`Human::kobzon`]
pub fn handlers(methods: &Methods) -> anyhow::Result<HandlerTable> {
    let store: Store = Arc::new(Mutex::new(HashMap::from([(KNOWN_ID, Human::kobzon())])));
    let greet = Arc::new(greet()?);
    let gate = Arc::new(Notify::new());
    let mut handlers = HandlerTable::new();
    handlers.register(methods.get_human_by_id.clone(), {
        let store = Arc::clone(&store);
        move |_, args| get_human_by_id(Arc::clone(&store), args)
    })?;
    handlers.register(methods.add_human.clone(), {
        let store = Arc::clone(&store);
        move |_, args| add_human(Arc::clone(&store), args)
    })?;
    handlers.register(methods.count_humans.clone(), move |_, _| {
        count_humans(Arc::clone(&store))
    })?;
    handlers.register(methods.explode.clone(), |_, _| explode())?;
    handlers.register(methods.greet_back.clone(), move |cx, args| {
        greet_back(cx, Arc::clone(&greet), args)
    })?;
    handlers.register(methods.wait.clone(), {
        let gate = Arc::clone(&gate);
        move |_, _| wait(Arc::clone(&gate))
    })?;
    handlers.register(methods.release.clone(), move |_, _| release(Arc::clone(&gate)))?;
    Ok(handlers)
}

/// Handlers clients serve on their callback stream
pub fn callbacks() -> anyhow::Result<HandlerTable> {
    HandlerTable::new().with(greet()?, greet_callback)
}
