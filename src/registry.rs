//! Fixed-capacity store of sensor handles addressed by generation-checked ids.
//!
//! A [`SensorId`] records the slot it was issued for and that slot's generation.
//! Destroying a sensor bumps the generation, so a stale or foreign id can never
//! reach a live handle: [`SensorRegistry::destroy`] refuses it and frees nothing.

use embedded_hal::delay::DelayNs;

use crate::config::Config;
use crate::dht22::Dht22;
use crate::error::DhtError;
use crate::logging::{error, info};
use crate::protocol::DataLine;

/// Identity of a sensor held by a [`SensorRegistry`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SensorId {
    index: usize,
    generation: u32,
}

struct Slot<PIN, DELAY> {
    generation: u32,
    sensor: Option<Dht22<PIN, DELAY>>,
}

/// Up to `N` sensors, at most one per pin.
pub struct SensorRegistry<PIN, DELAY, const N: usize> {
    slots: [Slot<PIN, DELAY>; N],
}

impl<PIN, DELAY, const N: usize> SensorRegistry<PIN, DELAY, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                sensor: None,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.sensors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: SensorId) -> Option<&Dht22<PIN, DELAY>> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.sensor.as_ref())
    }

    pub fn get_mut(&mut self, id: SensorId) -> Option<&mut Dht22<PIN, DELAY>> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.sensor.as_mut())
    }

    fn sensors(&self) -> impl Iterator<Item = &Dht22<PIN, DELAY>> {
        self.slots.iter().filter_map(|slot| slot.sensor.as_ref())
    }
}

impl<PIN, DELAY, E, const N: usize> SensorRegistry<PIN, DELAY, N>
where
    PIN: DataLine<Error = E>,
    DELAY: DelayNs,
{
    /// Creates a sensor on `pin_id` and returns its id.
    ///
    /// # Errors
    ///
    /// * `DhtError::InvalidInput` if `pin_id` already belongs to a live sensor, or
    ///   for any input [`Dht22::with_config`] rejects.
    /// * `DhtError::AllocationFailed` if all `N` slots are taken.
    /// * `DhtError::PinMode` if the pull-up cannot be enabled.
    ///
    /// As with [`Dht22::with_config`], `pin` and `delay` are dropped on error.
    pub fn create(
        &mut self,
        pin_id: u8,
        name: &str,
        pin: PIN,
        delay: DELAY,
        config: Config,
        now_ms: u64,
    ) -> Result<SensorId, DhtError<E>> {
        if self.sensors().any(|sensor| sensor.pin_id() == pin_id) {
            error!("pin '{}' is already in use", pin_id);
            return Err(DhtError::InvalidInput);
        }

        let Some(index) = self.slots.iter().position(|slot| slot.sensor.is_none()) else {
            error!("no free slot for sensor on pin '{}'", pin_id);
            return Err(DhtError::AllocationFailed);
        };

        let sensor = Dht22::with_config(pin_id, name, pin, delay, config, now_ms)?;
        let slot = &mut self.slots[index];
        slot.sensor = Some(sensor);

        Ok(SensorId {
            index,
            generation: slot.generation,
        })
    }

    /// Removes the sensor behind `id` and hands back its pin and delay.
    ///
    /// # Errors
    ///
    /// `DhtError::InvalidInput` if `id` does not name a live sensor, for instance
    /// after it was already destroyed. Nothing is released in that case.
    pub fn destroy(&mut self, id: SensorId) -> Result<(PIN, DELAY), DhtError<E>> {
        let sensor = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| {
                let sensor = slot.sensor.take()?;
                slot.generation = slot.generation.wrapping_add(1);
                Some(sensor)
            });

        match sensor {
            Some(sensor) => {
                info!("destroyed sensor in slot {}", id.index);
                Ok(sensor.release())
            }
            None => {
                error!(
                    "invalid sensor id (slot {}, generation {}), will not free",
                    id.index, id.generation
                );
                Err(DhtError::InvalidInput)
            }
        }
    }
}

impl<PIN, DELAY, const N: usize> Default for SensorRegistry<PIN, DELAY, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDelay, SimPin, SimSensor};

    type Registry<const N: usize> = SensorRegistry<SimPin, SimDelay, N>;

    #[test]
    fn test_create_and_read() {
        let sim = SimSensor::new();
        sim.set_reading(653, 231);

        let mut registry = Registry::<2>::new();
        let id = registry
            .create(5, "greenhouse", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();

        assert_eq!(registry.len(), 1);
        let m = registry.get_mut(id).unwrap().read(2000).unwrap();
        assert_eq!(m.humidity_tenths(), 653);
    }

    #[test]
    fn test_pin_is_exclusive() {
        let sim = SimSensor::new();
        let mut registry = Registry::<2>::new();
        registry
            .create(5, "one", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();

        let err = registry
            .create(5, "two", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap_err();
        assert_eq!(err, DhtError::InvalidInput);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_full_registry() {
        let sim = SimSensor::new();
        let mut registry = Registry::<1>::new();
        registry
            .create(4, "one", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();

        let err = registry
            .create(5, "two", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap_err();
        assert_eq!(err, DhtError::AllocationFailed);
    }

    #[test]
    fn test_failed_creation_leaves_slot_free() {
        let sim = SimSensor::new();
        let mut registry = Registry::<1>::new();
        let err = registry
            .create(5, "", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap_err();
        assert_eq!(err, DhtError::InvalidInput);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_destroy_is_refused() {
        let sim = SimSensor::new();
        let mut registry = Registry::<1>::new();
        let id = registry
            .create(5, "greenhouse", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();

        assert!(registry.destroy(id).is_ok());
        assert!(registry.is_empty());
        assert_eq!(registry.destroy(id).err(), Some(DhtError::InvalidInput));
    }

    #[test]
    fn test_stale_id_does_not_reach_new_sensor() {
        let sim = SimSensor::new();
        let mut registry = Registry::<1>::new();
        let old = registry
            .create(5, "old", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();
        registry.destroy(old).unwrap();

        // Same slot, same pin, new generation.
        let new = registry
            .create(5, "new", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();
        assert_ne!(old, new);

        assert!(registry.get(old).is_none());
        assert_eq!(registry.destroy(old).err(), Some(DhtError::InvalidInput));
        assert_eq!(registry.get(new).map(|s| s.name()), Some("new"));
    }

    #[test]
    fn test_foreign_id_is_refused() {
        let sim = SimSensor::new();
        let mut registry = Registry::<2>::new();
        let mut other = Registry::<4>::new();
        registry
            .create(5, "greenhouse", sim.pin(), sim.delay(), Config::default(), 0)
            .unwrap();
        for pin in 0..4 {
            other
                .create(pin, "other", sim.pin(), sim.delay(), Config::default(), 0)
                .unwrap();
        }

        // Ids from the larger registry point past this one's slots.
        let foreign = SensorId {
            index: 3,
            generation: 0,
        };
        assert!(other.get(foreign).is_some());
        assert_eq!(registry.destroy(foreign).err(), Some(DhtError::InvalidInput));
        assert_eq!(registry.len(), 1);
    }
}
