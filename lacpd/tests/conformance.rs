// End-to-end scenarios over the full engine (Receive/Periodic/Mux FSMs,
// selection, the event dispatcher), driven against the `testing`-feature
// fakes in place of the data-plane programmer and raw-frame transport.

use lacp_utils::mac_addr::MacAddr;
use lacpd::events;
use lacpd::fsm::mux::MuxState;
use lacpd::fsm::periodic::PeriodicState;
use lacpd::fsm::receive::{self, ReceiveState};
use lacpd::master::Master;
use lacpd::network::testing::FakeTransport;
use lacpd::northbound::configuration::testing::FakeConfigStore;
use lacpd::northbound::configuration::{InterfaceConfig, SystemConfig as ConfigStoreSystem};
use lacpd::packet::{Lacpdu, PduParty, StateFlags};
use lacpd::port::{PortConfig, PortIndex};
use lacpd::southbound::testing::FakeProgrammer;
use lacpd::tasks;
use lacpd::tasks::messages::input::{ConfigChangeMsg, ProtocolMsg};
use lacpd::types::{LacpActivity, PortHandle, PortType, Selected, SystemId};

fn new_master() -> Master {
    Master::new(
        Box::new(FakeProgrammer::default()),
        Box::new(FakeTransport::default()),
    )
}

fn active_config(key: u16, port_number: u16) -> PortConfig {
    PortConfig {
        mode: lacpd::types::LacpMode::Active,
        activity: LacpActivity::Active,
        key,
        port_number,
        aggregatable: true,
        ..Default::default()
    }
}

fn bring_up(master: &mut Master, index: PortIndex) {
    master.port_begin(index);
    master.ports.get_mut(index).unwrap().control.port_enabled = true;
    receive::dispatch(master, index, receive::Event::PortEnabled);
    assert_eq!(
        master.ports.get(index).unwrap().receive_state,
        ReceiveState::Expired
    );
}

/// Builds a LACPDU as seen from `remote`, reflecting back exactly what the
/// local port's own actor parameters currently are so `update_Selected`/
/// `choose_matched` see a perfectly synchronized partner view.
fn reflect_pdu(
    master: &Master,
    index: PortIndex,
    remote_system: SystemId,
    remote_key: u16,
    remote_port: u16,
    remote_state: StateFlags,
) -> Lacpdu {
    let port = master.ports.get(index).unwrap();
    Lacpdu {
        actor: PduParty {
            system: remote_system,
            key: remote_key,
            port_priority: 32768,
            port: remote_port,
            state: remote_state,
        },
        partner: PduParty {
            system: port.actor.system,
            key: port.actor.key,
            port_priority: port.actor.port_priority,
            port: port.actor.port_number,
            state: port.actor.state,
        },
        collector_max_delay: 0,
    }
}

fn remote_mac(byte: u8) -> MacAddr {
    MacAddr::from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, byte])
}

fn remote_synced() -> StateFlags {
    StateFlags::ACTIVITY
        | StateFlags::AGGREGATION
        | StateFlags::SYNCHRONIZATION
        | StateFlags::COLLECTING
        | StateFlags::DISTRIBUTING
}

#[test]
fn s1_two_ports_converge_to_a_single_lag() {
    let mut master = new_master();
    let p1 = master.ports.insert(
        PortHandle::new(1, 0),
        active_config(7, 1),
        PortType::Speed1G,
    );
    let p2 = master.ports.insert(
        PortHandle::new(2, 0),
        active_config(7, 2),
        PortType::Speed1G,
    );
    bring_up(&mut master, p1);
    bring_up(&mut master, p2);

    let remote_system = SystemId {
        priority: 32768,
        mac: remote_mac(0x01),
    };

    for _ in 0..12 {
        for (index, local_port_number) in [(p1, 1u16), (p2, 2u16)] {
            let pdu = reflect_pdu(&master, index, remote_system, 7, local_port_number, remote_synced());
            receive::on_pdu(&mut master, index, &pdu);
        }
        events::process_tick(&mut master);
        let both_up = master.ports.get(p1).unwrap().mux_state == MuxState::CollectingDistributing
            && master.ports.get(p2).unwrap().mux_state == MuxState::CollectingDistributing;
        if both_up {
            break;
        }
    }

    assert_eq!(
        master.ports.get(p1).unwrap().mux_state,
        MuxState::CollectingDistributing
    );
    assert_eq!(
        master.ports.get(p2).unwrap().mux_state,
        MuxState::CollectingDistributing
    );
    assert_eq!(master.lags.iter().count(), 1);
    let (_, lag) = master.lags.iter().next().unwrap();
    assert_eq!(lag.members.len(), 2);
}

#[test]
fn s2_loopback_pdu_is_dropped_without_state_change() {
    let mut master = new_master();
    let p1 = master
        .ports
        .insert(PortHandle::new(1, 0), active_config(7, 1), PortType::Speed1G);
    bring_up(&mut master, p1);

    let local_system = master.ports.get(p1).unwrap().actor.system;
    let pdu = reflect_pdu(&master, p1, local_system, 7, 1, remote_synced());
    let frame = pdu.encode();

    let before_state = master.ports.get(p1).unwrap().receive_state;
    let before_rx_count = master.ports.get(p1).unwrap().statistics.lacp_pdus_received;

    events::process_rx_pdu(&mut master, PortHandle::new(1, 0), &frame);

    assert_eq!(master.ports.get(p1).unwrap().receive_state, before_state);
    assert_eq!(
        master.ports.get(p1).unwrap().statistics.lacp_pdus_received,
        before_rx_count
    );
}

#[test]
fn s3_partner_individual_forces_unselected_and_detached() {
    let mut master = new_master();
    let p1 = master
        .ports
        .insert(PortHandle::new(1, 0), active_config(7, 1), PortType::Speed1G);
    bring_up(&mut master, p1);

    let remote_system = SystemId {
        priority: 32768,
        mac: remote_mac(0x02),
    };

    // First exchange: partner aggregatable, port joins a LAG and selects.
    let synced = reflect_pdu(&master, p1, remote_system, 7, 1, remote_synced());
    receive::on_pdu(&mut master, p1, &synced);
    for _ in 0..6 {
        events::process_tick(&mut master);
        let pdu = reflect_pdu(&master, p1, remote_system, 7, 1, remote_synced());
        receive::on_pdu(&mut master, p1, &pdu);
    }
    assert_eq!(
        master.ports.get(p1).unwrap().control.selected,
        Selected::Selected
    );

    // Peer now advertises Individual (Aggregation bit cleared).
    let individual_state = StateFlags::ACTIVITY | StateFlags::SYNCHRONIZATION;
    let pdu = reflect_pdu(&master, p1, remote_system, 7, 1, individual_state);
    receive::on_pdu(&mut master, p1, &pdu);

    assert_eq!(
        master.ports.get(p1).unwrap().control.selected,
        Selected::Unselected
    );
    assert_eq!(master.ports.get(p1).unwrap().mux_state, MuxState::Detached);
}

#[test]
fn s4_fallback_toggle_retriggers_defaulted_entry_action() {
    let mut master = new_master();
    let p1 = master.ports.insert(
        PortHandle::new(1, 0),
        PortConfig {
            mode: lacpd::types::LacpMode::Active,
            activity: LacpActivity::Active,
            key: 9,
            port_number: 1,
            aggregatable: true,
            fallback_enabled: false,
            ..Default::default()
        },
        PortType::Speed1G,
    );
    bring_up(&mut master, p1);

    // Simulate a previously learned administrative default so recordDefault
    // yields a resolvable LAG_Id once Defaulted is entered.
    {
        let port = master.ports.get_mut(p1).unwrap();
        port.partner_admin.system = SystemId {
            priority: 32768,
            mac: remote_mac(0x03),
        };
        port.partner_admin.key = 9;
        port.partner_admin.aggregatable = true;
    }

    receive::dispatch(&mut master, p1, receive::Event::CurrentWhileExpired);
    assert_eq!(
        master.ports.get(p1).unwrap().receive_state,
        ReceiveState::Defaulted
    );
    assert!(
        !master
            .ports
            .get(p1)
            .unwrap()
            .partner
            .state
            .contains(StateFlags::SYNCHRONIZATION)
    );

    let config = PortConfig {
        mode: lacpd::types::LacpMode::Active,
        activity: LacpActivity::Active,
        key: 9,
        port_number: 1,
        aggregatable: true,
        fallback_enabled: true,
        ..Default::default()
    };
    events::process_config_change(
        &mut master,
        ConfigChangeMsg {
            port: PortHandle::new(1, 0),
            port_type: PortType::Speed1G,
            config,
        },
    );

    assert_eq!(
        master.ports.get(p1).unwrap().receive_state,
        ReceiveState::Defaulted
    );
    assert!(
        master
            .ports
            .get(p1)
            .unwrap()
            .partner
            .state
            .contains(StateFlags::SYNCHRONIZATION),
        "fallback toggle should re-run the Defaulted entry action immediately"
    );
    assert_ne!(master.ports.get(p1).unwrap().mux_state, MuxState::Detached);
}

#[test]
fn s5_partner_timeout_switch_moves_periodic_between_fast_and_slow() {
    let mut master = new_master();
    let p1 = master
        .ports
        .insert(PortHandle::new(1, 0), active_config(7, 1), PortType::Speed1G);
    bring_up(&mut master, p1);

    let remote_system = SystemId {
        priority: 32768,
        mac: remote_mac(0x04),
    };

    let long_timeout = StateFlags::ACTIVITY | StateFlags::AGGREGATION;
    let pdu = reflect_pdu(&master, p1, remote_system, 7, 1, long_timeout);
    receive::on_pdu(&mut master, p1, &pdu);
    assert_eq!(
        master.ports.get(p1).unwrap().periodic_state,
        PeriodicState::SlowPeriodic
    );

    let short_timeout = long_timeout | StateFlags::TIMEOUT;
    let pdu = reflect_pdu(&master, p1, remote_system, 7, 1, short_timeout);
    receive::on_pdu(&mut master, p1, &pdu);
    assert_eq!(
        master.ports.get(p1).unwrap().periodic_state,
        PeriodicState::FastPeriodic
    );
}

#[test]
fn s6_lag_disbands_only_after_its_last_member_leaves() {
    let mut master = new_master();
    let p1 = master.ports.insert(
        PortHandle::new(1, 0),
        active_config(3, 1),
        PortType::Speed1G,
    );
    let p2 = master.ports.insert(
        PortHandle::new(2, 0),
        active_config(3, 2),
        PortType::Speed1G,
    );
    bring_up(&mut master, p1);
    bring_up(&mut master, p2);

    let remote_system = SystemId {
        priority: 32768,
        mac: remote_mac(0x05),
    };
    for (index, local_port_number) in [(p1, 1u16), (p2, 2u16)] {
        let pdu = reflect_pdu(&master, index, remote_system, 3, local_port_number, remote_synced());
        receive::on_pdu(&mut master, index, &pdu);
    }

    assert_eq!(master.lags.iter().count(), 1);

    events::process_config_remove(&mut master, PortHandle::new(1, 0));
    assert_eq!(
        master.lags.iter().count(),
        1,
        "LAG survives while one member remains"
    );

    events::process_config_remove(&mut master, PortHandle::new(2, 0));
    assert_eq!(
        master.lags.iter().count(),
        0,
        "LAG is destroyed once its last member leaves"
    );
}

#[test]
fn lag_tracks_highest_member_port_priority() {
    let mut master = new_master();
    let low = PortConfig {
        port_priority: 100,
        ..active_config(3, 1)
    };
    let high = PortConfig {
        port_priority: 200,
        ..active_config(3, 2)
    };
    let p1 = master.ports.insert(PortHandle::new(1, 0), low, PortType::Speed1G);
    let p2 = master.ports.insert(PortHandle::new(2, 0), high, PortType::Speed1G);
    bring_up(&mut master, p1);
    bring_up(&mut master, p2);

    let remote_system = SystemId {
        priority: 32768,
        mac: remote_mac(0x09),
    };
    for (index, local_port_number) in [(p1, 1u16), (p2, 2u16)] {
        let pdu = reflect_pdu(&master, index, remote_system, 3, local_port_number, remote_synced());
        receive::on_pdu(&mut master, index, &pdu);
    }

    let lag_index = master.ports.get(p1).unwrap().lag.unwrap();
    assert_eq!(master.lags.get(lag_index).unwrap().max_port_priority, 200);

    events::process_config_remove(&mut master, PortHandle::new(2, 0));
    let lag_index = master.ports.get(p1).unwrap().lag.unwrap();
    assert_eq!(master.lags.get(lag_index).unwrap().max_port_priority, 100);
}

#[test]
fn load_config_pulls_initial_snapshot_from_config_store() {
    let store = FakeConfigStore {
        system: ConfigStoreSystem {
            system_mac: remote_mac(0x01),
            system_id_override: None,
            system_priority: 100,
        },
        interfaces: vec![InterfaceConfig {
            port: PortHandle::new(1, 0),
            port_type: PortType::Speed1G,
            lacp: active_config(3, 1),
            link_state: true,
            link_speed_bps: 1_000_000_000,
        }],
    };

    let mut master = new_master();
    master.load_config(&store);

    assert_eq!(master.system.id.mac, remote_mac(0x01));
    assert_eq!(master.system.id.priority, 100);

    let (index, port) = master.ports.get_by_handle(PortHandle::new(1, 0)).unwrap();
    assert_eq!(port.actor.system.mac, remote_mac(0x01));
    assert!(port.control.port_enabled);
    assert_eq!(
        master.ports.get(index).unwrap().receive_state,
        ReceiveState::Expired
    );
}

#[tokio::test]
async fn event_loop_stops_after_shutdown_is_requested() {
    let mut master = new_master();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    tx.send(ProtocolMsg::Tick).await.unwrap();
    tx.send(ProtocolMsg::Tick).await.unwrap();
    master.request_shutdown();

    tasks::run(&mut master, &mut rx).await;

    assert!(
        rx.try_recv().is_ok(),
        "second queued message was left unconsumed once shutdown fired"
    );
}
