mod client;

pub use client::{
    AccountInfo, ApiErrorClass, Link, RemoteClient, RemoteError, Resource, ResourceList,
    ResourceType,
};
