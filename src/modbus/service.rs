// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus request handling over a transport-local register bank
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! ## Supported function codes
//!
//! | Code | Request | Area |
//! |------|---------|------|
//! | 0x01 | Read Coils | Coil |
//! | 0x02 | Read Discrete Inputs | Discrete |
//! | 0x03 | Read Holding Registers | Holding |
//! | 0x04 | Read Input Registers | Input |
//! | 0x05 | Write Single Coil | Coil |
//! | 0x06 | Write Single Register | Holding |
//! | 0x0F | Write Multiple Coils | Coil |
//! | 0x10 | Write Multiple Registers | Holding |
//! | 0x17 | Read/Write Multiple Registers | Holding |
//!
//! Any other function code is answered with `IllegalFunction`.
//!
//! On a serial line several slaves share the bus, so the RTU engine wraps the
//! service in an [`AddressedService`] that ignores frames sent to other units.

use std::future;

use log::{debug, error, warn};
use tokio_modbus::prelude::*;

use crate::modbus::engine::{ConnectionGuard, EngineCounters, LocalRegisters};
use crate::registers::RegisterArea;

/// Largest register count a single read may request (Modbus application protocol)
const MAX_READ_REGISTERS: u16 = 125;
/// Largest coil count a single read may request
const MAX_READ_BITS: u16 = 2000;

/// A `tokio_modbus` service answering requests from a local register bank.
///
/// The TCP engine creates one instance per client connection, holding a
/// [`ConnectionGuard`] so the connection is counted while it is open. The RTU
/// engine uses a single instance for the serial line.
pub struct LocalRegisterService {
    registers: LocalRegisters,
    counters: EngineCounters,
    _connection: Option<ConnectionGuard>,
}

impl LocalRegisterService {
    /// Service for a serial line, not tied to any connection
    pub fn new(registers: LocalRegisters, counters: EngineCounters) -> Self {
        Self {
            registers,
            counters,
            _connection: None,
        }
    }

    /// Service for one network client
    pub fn for_connection(registers: LocalRegisters, counters: EngineCounters) -> Self {
        let guard = counters.open_connection();
        Self {
            registers,
            counters,
            _connection: Some(guard),
        }
    }

    fn read_words(
        &self,
        area: RegisterArea,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        if cnt == 0 || cnt > MAX_READ_REGISTERS {
            return Err(ExceptionCode::IllegalDataValue);
        }
        self.registers.read(area, addr, cnt).map_err(|e| {
            error!("Exception::IllegalDataAddress - {}", e);
            ExceptionCode::IllegalDataAddress
        })
    }

    fn read_bits(
        &self,
        area: RegisterArea,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<bool>, ExceptionCode> {
        if cnt == 0 || cnt > MAX_READ_BITS {
            return Err(ExceptionCode::IllegalDataValue);
        }
        self.registers.read_bits(area, addr, cnt).map_err(|e| {
            error!("Exception::IllegalDataAddress - {}", e);
            ExceptionCode::IllegalDataAddress
        })
    }

    fn write_words(&self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        self.registers
            .write(RegisterArea::Holding, addr, values)
            .map_err(|e| {
                error!("Exception::IllegalDataAddress - {}", e);
                ExceptionCode::IllegalDataAddress
            })
    }

    fn write_bits(&self, addr: u16, values: &[bool]) -> Result<(), ExceptionCode> {
        self.registers
            .write_bits(RegisterArea::Coil, addr, values)
            .map_err(|e| {
                error!("Exception::IllegalDataAddress - {}", e);
                ExceptionCode::IllegalDataAddress
            })
    }

    /// Dispatch one request to the register bank
    fn handle(&self, req: Request<'static>) -> Result<Response, ExceptionCode> {
        match req {
            Request::ReadCoils(addr, cnt) => self
                .read_bits(RegisterArea::Coil, addr, cnt)
                .map(Response::ReadCoils),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .read_bits(RegisterArea::Discrete, addr, cnt)
                .map(Response::ReadDiscreteInputs),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .read_words(RegisterArea::Holding, addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .read_words(RegisterArea::Input, addr, cnt)
                .map(Response::ReadInputRegisters),
            Request::WriteSingleCoil(addr, value) => self
                .write_bits(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleCoil(addr, value)),
            Request::WriteSingleRegister(addr, value) => self
                .write_words(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleCoils(addr, values) => self
                .write_bits(addr, &values)
                .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16)),
            Request::WriteMultipleRegisters(addr, values) => self
                .write_words(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::ReadWriteMultipleRegisters(read_addr, cnt, write_addr, values) => {
                // The write is performed before the read
                self.write_words(write_addr, &values)?;
                self.read_words(RegisterArea::Holding, read_addr, cnt)
                    .map(Response::ReadWriteMultipleRegisters)
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        }
    }

    /// Count, dispatch and log one request
    fn process(&self, req: Request<'static>) -> Result<Response, ExceptionCode> {
        debug!("Received Modbus request: {:?}", req);
        self.counters.record_message();

        let res = self.handle(req);
        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }
        res
    }
}

impl tokio_modbus::server::Service for LocalRegisterService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.process(req))
    }
}

/// Unit id of a broadcast frame
const BROADCAST_SLAVE: SlaveId = 0;

/// Service answering only the frames addressed to one slave id.
///
/// Frames for other units get no response at all. Broadcast writes are
/// applied without a response, other broadcast requests are dropped.
pub struct AddressedService {
    slave: SlaveId,
    inner: LocalRegisterService,
}

impl AddressedService {
    pub fn new(slave: SlaveId, inner: LocalRegisterService) -> Self {
        Self { slave, inner }
    }

    fn dispatch(&self, req: SlaveRequest<'static>) -> Result<Option<Response>, ExceptionCode> {
        let SlaveRequest { slave, request } = req;
        if slave == self.slave {
            return self.inner.process(request).map(Some);
        }
        if slave == BROADCAST_SLAVE && is_write(&request) {
            if let Err(e) = self.inner.process(request) {
                warn!("Broadcast write not applied: {:?}", e);
            }
            return Ok(None);
        }
        debug!(
            "Ignoring request for slave {} (this unit is {})",
            slave, self.slave
        );
        Ok(None)
    }
}

impl tokio_modbus::server::Service for AddressedService {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.dispatch(req))
    }
}

fn is_write(request: &Request<'_>) -> bool {
    matches!(
        request,
        Request::WriteSingleCoil(..)
            | Request::WriteSingleRegister(..)
            | Request::WriteMultipleCoils(..)
            | Request::WriteMultipleRegisters(..)
    )
}
